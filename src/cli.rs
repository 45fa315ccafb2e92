use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::ConfigError;
use crate::form::{ConfigForm, Mode};
use crate::models::{ConfigRecord, FieldKey, FieldKind, FieldValue, FIELDS, MASK};
use crate::remote::{HttpRemoteStore, RemoteStore};
use crate::{build_router, AppState};

#[derive(Parser)]
#[command(
    name = "vaultwarden-config",
    about = "Vaultwarden plugin configuration: web form and command line",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Base URL of the plugin's config endpoints
    /// (default: http://$PLUGIN_HOST:3000/api/plugins/$PLUGIN_NAME)
    #[arg(long, global = true)]
    pub url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the configuration form
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Hand the configuration to --output instead of the plugin host
        #[arg(long, requires = "output")]
        pre_install: bool,
        /// JSON file to seed the form with instead of loading it
        #[arg(long)]
        seed: Option<PathBuf>,
        /// Where the pre-install configuration is written
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the current configuration
    Show {
        /// Print secrets in clear text
        #[arg(long)]
        reveal: bool,
    },

    /// Change fields, save and restart (e.g. `set PORT=8200 ALLOW_SIGNUPS=false`)
    Set {
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<Assignment>,
    },

    /// Restart the service without changing its configuration
    Restart,

    /// Write a pre-install configuration file without contacting the host
    Init {
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
        /// JSON file to start from (defaults otherwise)
        #[arg(long)]
        seed: Option<PathBuf>,
        #[arg(value_parser = parse_assignment)]
        assignments: Vec<Assignment>,
    },
}

/// A `KEY=VALUE` argument, checked against the field's kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub key: FieldKey,
    pub value: FieldValue,
}

pub fn parse_assignment(arg: &str) -> Result<Assignment, String> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", arg))?;
    let key: FieldKey = key.parse().map_err(|e: ConfigError| e.to_string())?;
    let value = FieldValue::parse_for(key, raw).map_err(|e| e.to_string())?;
    Ok(Assignment { key, value })
}

pub fn read_seed(path: &Path) -> Result<ConfigRecord, ConfigError> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

pub fn write_record(path: &Path, record: &ConfigRecord) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json)?;
    tracing::info!("Wrote configuration to {}", path.display());
    Ok(())
}

pub async fn run_cli(command: Commands, mut config: Config) {
    match command {
        Commands::Serve {
            host,
            port,
            pre_install,
            seed,
            output,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config, pre_install, seed, output).await;
        }

        Commands::Show { reveal } => {
            let store = connect(&config);
            let mut form = ConfigForm::new(Mode::Normal);
            if let Err(e) = form.initialize(None, &store).await {
                fail(&e);
            }

            let record = if reveal {
                form.draft().clone()
            } else {
                form.draft().redacted()
            };
            print_record(&record);
        }

        Commands::Set { assignments } => {
            let store = connect(&config);
            let mut form = ConfigForm::new(Mode::Normal);
            // Saving defaults over a config we could not read would wipe it.
            if let Err(e) = form.initialize(None, &store).await {
                eprintln!("✗ {} (nothing was saved)", e);
                std::process::exit(1);
            }

            apply(&mut form, &assignments);

            match form.save(&store).await {
                Ok(_) => {
                    println!("✓ Saved {} field(s) and requested a restart", assignments.len());
                    for a in &assignments {
                        println!("  {:<14} {}", a.key, display_value(a.key, &a.value));
                    }
                }
                Err(e) => fail(&e),
            }
        }

        Commands::Restart => {
            let store = connect(&config);
            match store.restart().await {
                Ok(()) => println!("✓ Restart requested"),
                Err(e) => fail(&e),
            }
        }

        Commands::Init {
            output,
            seed,
            assignments,
        } => {
            let seed = match seed.as_deref().map(read_seed).transpose() {
                Ok(seed) => seed.unwrap_or_default(),
                Err(e) => fail(&e),
            };

            let target = output.clone();
            let mut form =
                ConfigForm::new(Mode::PreInstall).on_save(move |record| write_record(&target, record));
            if let Err(e) = form.seed(seed) {
                fail(&e);
            }
            apply(&mut form, &assignments);

            match form.hand_off() {
                Ok(_) => println!("✓ Configuration written to '{}'", output.display()),
                Err(e) => fail(&e),
            }
        }
    }
}

async fn serve(config: Config, pre_install: bool, seed: Option<PathBuf>, output: Option<PathBuf>) {
    let store = connect(&config);

    let seed = match seed.as_deref().map(read_seed).transpose() {
        Ok(seed) => seed,
        Err(e) => {
            eprintln!("✗ Cannot read seed file: {}", e);
            std::process::exit(1);
        }
    };

    let mode = if pre_install { Mode::PreInstall } else { Mode::Normal };
    let mut form = ConfigForm::new(mode)
        .on_change(|record| tracing::debug!(domain = %record.domain, "Draft updated"));
    if let Some(path) = output {
        form = form.on_save(move |record| write_record(&path, record));
    }

    if let Err(e) = form.initialize(seed, &store).await {
        tracing::warn!("Starting with default configuration: {}", e);
    }

    tracing::info!("Plugin host: {}", config.remote_url);
    tracing::info!(
        "Starting configuration form on http://{}:{} ({:?} mode)",
        config.host,
        config.port,
        mode
    );

    let addr = format!("{}:{}", config.host, config.port);
    let store: Arc<dyn RemoteStore> = Arc::new(store);
    let state = Arc::new(AppState::new(form, store, config));
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("✗ Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    println!(
        r#"
    Vaultwarden Configuration
    ─────────────────────────────────────────
    Form:  http://{}
    API:   http://{}/api/form
    "#,
        &addr, &addr
    );

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}

fn connect(config: &Config) -> HttpRemoteStore {
    match HttpRemoteStore::new(&config.remote_url, config.request_timeout) {
        Ok(store) => store,
        Err(e) => fail(&e),
    }
}

fn apply(form: &mut ConfigForm, assignments: &[Assignment]) {
    for a in assignments {
        if let Err(e) = form.set_field(a.key, a.value.clone()) {
            fail(&e);
        }
    }
}

fn display_value(key: FieldKey, value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) if key.spec().kind == FieldKind::Secret && !s.is_empty() => {
            MASK.to_string()
        }
        other => other.to_string(),
    }
}

fn print_record(record: &ConfigRecord) {
    println!("{:<16} {:<16} {}", "FIELD", "KEY", "VALUE");
    println!("{}", "─".repeat(70));
    for spec in FIELDS.iter() {
        println!(
            "{:<16} {:<16} {}",
            spec.label,
            spec.key.as_str(),
            record.get(spec.key)
        );
    }
    if !record.extra.is_empty() {
        println!("{}", "─".repeat(70));
        for (key, value) in &record.extra {
            println!("{:<16} {:<16} {}", "(other)", key, value);
        }
    }
}

fn fail(e: &ConfigError) -> ! {
    eprintln!("✗ {}", e);
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_are_typed_by_field() {
        assert_eq!(
            parse_assignment("allow_signups=yes").unwrap(),
            Assignment {
                key: FieldKey::AllowSignups,
                value: FieldValue::Bool(true)
            }
        );
        assert_eq!(
            parse_assignment("DOMAIN=https://vault.example.com/?a=b").unwrap(),
            Assignment {
                key: FieldKey::Domain,
                value: FieldValue::Text("https://vault.example.com/?a=b".to_string())
            }
        );
        assert!(parse_assignment("PORT").is_err());
        assert!(parse_assignment("NOPE=1").is_err());
        assert!(parse_assignment("USE_SENDMAIL=sometimes").is_err());
    }

    #[test]
    fn secrets_are_masked_in_summaries() {
        assert_eq!(
            display_value(FieldKey::SmtpPassword, &FieldValue::Text("pw".to_string())),
            "********"
        );
        assert_eq!(
            display_value(FieldKey::SmtpHost, &FieldValue::Text("mx".to_string())),
            "mx"
        );
    }

    #[test]
    fn seed_file_round_trips_through_write_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vaultwarden.json");
        let record = ConfigRecord {
            domain: "https://vault.example.com".to_string(),
            ..ConfigRecord::default()
        };

        write_record(&path, &record).unwrap();

        assert_eq!(read_seed(&path).unwrap(), record);
    }

    #[test]
    fn cli_parses_serve_flags() {
        let cli = Cli::try_parse_from([
            "vaultwarden-config",
            "--url",
            "http://nas:3000/api/plugins/vaultwarden",
            "serve",
            "--pre-install",
            "--output",
            "out.json",
        ])
        .unwrap();

        assert_eq!(cli.url.as_deref(), Some("http://nas:3000/api/plugins/vaultwarden"));
        assert!(matches!(
            cli.command,
            Commands::Serve {
                pre_install: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn run_cli_dispatches_init_without_contacting_the_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vaultwarden.json");
        let cli = Cli::try_parse_from([
            "vaultwarden-config",
            "init",
            "--output",
            path.to_str().unwrap(),
            "SIGNUPS_ALLOWED=true",
            "SMTP_PORT=465",
        ]);
        // SIGNUPS_ALLOWED is not a field; the parse must fail before anything runs.
        assert!(cli.is_err());

        let cli = Cli::try_parse_from([
            "vaultwarden-config",
            "--url",
            "http://127.0.0.1:9/api/plugins/vaultwarden",
            "init",
            "--output",
            path.to_str().unwrap(),
            "ALLOW_SIGNUPS=true",
            "SMTP_PORT=465",
        ])
        .unwrap();
        let config = Config {
            remote_url: cli.url.clone().unwrap(),
            ..Config::default()
        };

        run_cli(cli.command, config).await;

        let written = read_seed(&path).unwrap();
        assert!(written.allow_signups);
        assert_eq!(written.smtp_port, "465");
        assert_eq!(written.port, "8100");
    }

    #[test]
    fn pre_install_serve_requires_output() {
        assert!(Cli::try_parse_from(["vaultwarden-config", "serve", "--pre-install"]).is_err());
    }
}
