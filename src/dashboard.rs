use std::sync::Arc;

use axum::{extract::State, response::Html, routing::get, Router};

use crate::form::{FormSnapshot, Mode};
use crate::models::{FieldKind, FieldValue, Section};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(form_page))
}

async fn form_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let snapshot = state.form.lock().await.snapshot();
    Html(render_form_page(&state.config.remote_url, &snapshot))
}

fn render_section(snapshot: &FormSnapshot, section: Section) -> String {
    let fields: String = snapshot
        .fields
        .iter()
        .filter(|spec| spec.section == section)
        .map(|spec| {
            let key = spec.key.as_str();
            match (spec.kind, snapshot.record.get(spec.key)) {
                (FieldKind::Toggle, FieldValue::Bool(on)) => format!(
                    r#"
                <label class="switch-row" for="field-{key}">
                    <input type="checkbox" id="field-{key}" data-key="{key}" class="field-toggle"{checked}>
                    <span class="switch"></span>
                    <span class="switch-label">{label}</span>
                </label>
                <p class="form-hint">{helper}</p>"#,
                    key = key,
                    checked = if on { " checked" } else { "" },
                    label = spec.label,
                    helper = spec.helper,
                ),
                (kind, value) => format!(
                    r#"
                <div class="form-group">
                    <label class="form-label" for="field-{key}">{label}</label>
                    <input type="{input_type}" id="field-{key}" data-key="{key}" class="form-input field-text"
                        value="{value}" autocomplete="off">
                    <p class="form-hint">{helper}</p>
                </div>"#,
                    key = key,
                    label = spec.label,
                    input_type = if kind == FieldKind::Secret { "password" } else { "text" },
                    value = escape_html(&value.to_string()),
                    helper = spec.helper,
                ),
            }
        })
        .collect();

    format!(
        r#"
            <div class="section">
                <h2 class="section-title">{title}</h2>
                {fields}
            </div>"#,
        title = section.title(),
        fields = fields
    )
}

pub fn render_form_page(remote_url: &str, snapshot: &FormSnapshot) -> String {
    let save_label = match snapshot.mode {
        Mode::PreInstall => "Install with Configuration",
        Mode::Normal => "Save Configuration",
    };
    let error_banner = match &snapshot.last_error {
        Some(message) => format!(
            r#"<div class="banner banner-error" id="last-error">{}</div>"#,
            escape_html(message)
        ),
        None => String::new(),
    };
    let saved_at = snapshot
        .last_saved_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Vaultwarden Configuration</title>
    <style>
        :root {{
            --bg-primary: #0a0e1a;
            --bg-card: #1a1f35;
            --bg-input: #151b2e;
            --border-color: #2a3152;
            --border-hover: #3d4a7a;
            --text-primary: #e8ecf4;
            --text-secondary: #8892a8;
            --text-muted: #5a6580;
            --accent-primary: #6366f1;
            --accent-success: #10b981;
            --accent-danger: #ef4444;
            --gradient-primary: linear-gradient(135deg, #6366f1, #8b5cf6, #06b6d4);
            --radius-sm: 8px;
            --radius-lg: 16px;
        }}

        * {{ margin:0; padding:0; box-sizing:border-box; }}

        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Inter', sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            min-height: 100vh;
        }}

        .main {{ max-width: 720px; margin: 0 auto; padding: 2rem; }}

        .card {{
            background: var(--bg-card);
            border: 1px solid var(--border-color);
            border-radius: var(--radius-lg);
            padding: 2rem;
        }}

        .card-title {{ font-size: 1.35rem; font-weight: 700; margin-bottom: 0.25rem; }}
        .card-sub {{ font-size: 0.8rem; color: var(--text-muted); margin-bottom: 1.5rem; font-family: monospace; }}

        .section {{ margin-bottom: 1.5rem; }}
        .section-title {{ font-size: 0.95rem; font-weight: 600; color: var(--text-secondary); margin-bottom: 1rem; }}

        .form-group {{ margin-bottom: 1rem; }}
        .form-label {{ display: block; font-size: 0.85rem; font-weight: 600; margin-bottom: 0.4rem; }}
        .form-input {{
            width: 100%;
            padding: 10px 14px;
            background: var(--bg-input);
            border: 1px solid var(--border-color);
            border-radius: var(--radius-sm);
            color: var(--text-primary);
            font-size: 0.9rem;
        }}
        .form-input:focus {{ outline: none; border-color: var(--accent-primary); }}
        .form-hint {{ font-size: 0.75rem; color: var(--text-muted); margin-top: 0.3rem; margin-bottom: 0.75rem; }}

        .switch-row {{ display: flex; align-items: center; gap: 10px; cursor: pointer; }}
        .switch-row input {{ display: none; }}
        .switch {{
            width: 38px; height: 20px; border-radius: 10px;
            background: var(--border-color); position: relative; transition: background 0.2s;
        }}
        .switch::after {{
            content: ''; position: absolute; top: 2px; left: 2px;
            width: 16px; height: 16px; border-radius: 50%; background: white; transition: left 0.2s;
        }}
        .switch-row input:checked + .switch {{ background: var(--accent-primary); }}
        .switch-row input:checked + .switch::after {{ left: 20px; }}

        .actions {{ display: flex; gap: 12px; align-items: center; }}
        .btn {{
            padding: 10px 20px; border: none; border-radius: var(--radius-sm);
            font-size: 0.875rem; font-weight: 600; cursor: pointer;
        }}
        .btn-primary {{ background: var(--gradient-primary); color: white; }}
        .btn-secondary {{ background: var(--bg-card); color: var(--text-primary); border: 1px solid var(--border-color); }}
        .btn:disabled {{ opacity: 0.5; cursor: wait; }}
        .saved-at {{ font-size: 0.75rem; color: var(--text-muted); }}

        .banner {{ padding: 10px 14px; border-radius: var(--radius-sm); margin-bottom: 1rem; font-size: 0.85rem; }}
        .banner-error {{ background: rgba(239,68,68,0.12); border: 1px solid var(--accent-danger); }}

        .toast-container {{ position: fixed; bottom: 24px; right: 24px; display: flex; flex-direction: column; gap: 8px; }}
        .toast {{
            padding: 12px 16px; border-radius: var(--radius-sm); background: var(--bg-card);
            border: 1px solid var(--border-color); font-size: 0.85rem;
        }}
        .toast.success {{ border-color: var(--accent-success); }}
        .toast.error {{ border-color: var(--accent-danger); }}
    </style>
</head>
<body>
    <main class="main">
        <div class="card">
            <h1 class="card-title">Vaultwarden Configuration</h1>
            <p class="card-sub">{remote_url}</p>
            {error_banner}
            <form id="config-form" onsubmit="event.preventDefault(); saveForm();">
                {general}
                {email}
                <div class="actions">
                    <button type="submit" class="btn btn-primary" id="save-btn">{save_label}</button>
                    <button type="button" class="btn btn-secondary" id="reload-btn" onclick="reloadForm()">Reload</button>
                    <span class="saved-at">Last saved: <span id="saved-at">{saved_at}</span></span>
                </div>
            </form>
        </div>
    </main>

    <!-- Toast Container -->
    <div class="toast-container" id="toasts"></div>

    <script>
        const API = '/api';
        let pending = Promise.resolve();

        // ── Toast Notifications ─────────────────────────
        function toast(message, type = 'info') {{
            const el = document.createElement('div');
            el.className = 'toast ' + type;
            el.textContent = message;
            document.getElementById('toasts').appendChild(el);
            setTimeout(() => el.remove(), 3000);
        }}

        async function errorMessage(res) {{
            try {{
                const body = await res.json();
                return body.message || res.statusText;
            }} catch (e) {{
                return res.statusText;
            }}
        }}

        // ── Field Updates ───────────────────────────────
        // Updates are chained so a save never overtakes an edit.
        function updateField(key, value) {{
            pending = pending.then(async () => {{
                const res = await fetch(API + '/form/fields/' + encodeURIComponent(key), {{
                    method: 'PUT',
                    headers: {{ 'Content-Type': 'application/json' }},
                    body: JSON.stringify({{ value }})
                }});
                if (!res.ok) toast(await errorMessage(res), 'error');
            }}).catch(e => toast('Update failed: ' + e, 'error'));
        }}

        document.querySelectorAll('.field-text').forEach(input => {{
            input.addEventListener('change', () => updateField(input.dataset.key, input.value));
        }});
        document.querySelectorAll('.field-toggle').forEach(input => {{
            input.addEventListener('change', () => updateField(input.dataset.key, input.checked));
        }});

        // ── Save / Reload ───────────────────────────────
        async function saveForm() {{
            const btn = document.getElementById('save-btn');
            btn.disabled = true;
            try {{
                await pending;
                const res = await fetch(API + '/form/save', {{ method: 'POST' }});
                if (!res.ok) {{
                    toast(await errorMessage(res), 'error');
                    return;
                }}
                const body = await res.json();
                if (body.form.last_saved_at) {{
                    document.getElementById('saved-at').textContent = body.form.last_saved_at;
                }}
                toast(body.outcome === 'handed_off' ? 'Configuration accepted' : 'Configuration saved, restarting', 'success');
            }} catch (e) {{
                toast('Save failed: ' + e, 'error');
            }} finally {{
                btn.disabled = false;
            }}
        }}

        async function reloadForm() {{
            const res = await fetch(API + '/form/reload', {{ method: 'POST' }});
            if (!res.ok) {{
                toast(await errorMessage(res), 'error');
                return;
            }}
            location.reload();
        }}
    </script>
</body>
</html>"##,
        remote_url = escape_html(remote_url),
        error_banner = error_banner,
        general = render_section(snapshot, Section::General),
        email = render_section(snapshot, Section::Email),
        save_label = save_label,
        saved_at = saved_at,
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
