use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use api_harness::config::{
    ClientSettings, Config, ENV_BASE_URL, ENV_CONTINUE_ON_FAILURE, ENV_COOKIE_FILE, ENV_ORIGIN, ENV_TIMEOUT,
};
use api_harness::harness::{Scenario, ScenarioRunner};
use api_harness::logging::init_tracing;
use api_harness::session::{Credentials, RequestOptions, SessionClient};
use api_harness::transport::Method;
use serde_json::Value;

/// API Harness - scripted, cookie-aware runs against a JSON REST API
#[derive(Parser, Debug)]
#[command(
    name = "api-harness",
    about = "Cookie-aware session client and scenario runner for JSON REST APIs",
    after_help = "ENVIRONMENT VARIABLES:\n\
        API_HARNESS_BASE_URL              Base URL of the API under test\n\
        API_HARNESS_ORIGIN                Origin header (empty disables)\n\
        API_HARNESS_TIMEOUT               Per-request timeout in seconds\n\
        API_HARNESS_COOKIE_FILE           Cookie persistence file\n\
        API_HARNESS_CONTINUE_ON_FAILURE   Keep running after a failed step\n\
        RUST_LOG / LOG_FORMAT=json        Log filter and format"
)]
struct Cli {
    /// Debug-level logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Connection options shared by every subcommand
#[derive(Args, Debug)]
struct Connection {
    /// Base URL of the API under test
    #[arg(long, env = ENV_BASE_URL)]
    base_url: Option<String>,

    /// Origin header sent with every request (empty disables)
    #[arg(long, env = ENV_ORIGIN)]
    origin: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = ENV_TIMEOUT)]
    timeout: Option<u64>,

    /// Load cookies from and save cookies to this file
    #[arg(long, short = 'c', env = ENV_COOKIE_FILE)]
    cookie_file: Option<PathBuf>,

    /// Reject malformed Set-Cookie headers instead of skipping them
    #[arg(long)]
    strict_cookies: bool,
}

impl Connection {
    fn settings(&self, base: ClientSettings) -> ClientSettings {
        let mut settings = base.strict_cookies(self.strict_cookies);
        if let Some(base_url) = &self.base_url {
            settings = settings.base_url(base_url);
        }
        if let Some(origin) = &self.origin {
            settings = settings.origin(origin);
        }
        if let Some(secs) = self.timeout {
            settings = settings.timeout(Duration::from_secs(secs));
        }
        if let Some(path) = &self.cookie_file {
            settings = settings.cookie_file(path);
        }
        settings
    }

    /// Build a client; the cookie file, if any, is preloaded
    fn client(&self, base: ClientSettings) -> Result<(SessionClient, ClientSettings), Box<dyn Error>> {
        let settings = self.settings(base);
        let client = SessionClient::new(&settings)?;
        Ok((client, settings))
    }
}

fn save_cookies(client: &SessionClient, settings: &ClientSettings) -> Result<(), Box<dyn Error>> {
    if let Some(path) = &settings.cookie_file {
        client.jar().save_file(path)?;
    }
    Ok(())
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario file and print its report
    Run {
        /// Scenario JSON file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Keep running steps after a failure
        #[arg(long, env = ENV_CONTINUE_ON_FAILURE)]
        continue_on_failure: bool,

        /// Scenario variable as key=value (value parsed as JSON when possible)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        connection: Connection,
    },

    /// Log in and store the session cookie
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        #[command(flatten)]
        connection: Connection,
    },

    /// Send a single request through the session and print the envelope
    Request {
        /// HTTP method
        method: String,

        /// Path relative to the base URL
        path: String,

        /// JSON body
        #[arg(short, long)]
        body: Option<String>,

        /// Extra header as "Name: value"
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        #[command(flatten)]
        connection: Connection,
    },

    /// Show or clear the cookies stored in the cookie file
    Cookies {
        /// Remove every stored cookie
        #[arg(long)]
        clear: bool,

        #[command(flatten)]
        connection: Connection,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let Config { client: base, runner: mut runner_settings } = Config::from_env();

    match cli.command {
        Commands::Run {
            scenario,
            continue_on_failure,
            vars,
            json,
            connection,
        } => {
            let mut scenario = Scenario::from_file(&scenario)?;
            scenario.vars.extend(parse_vars(&vars)?);
            runner_settings.continue_on_failure |= continue_on_failure;

            let (client, settings) = connection.client(base)?;
            let mut runner = ScenarioRunner::with_settings(client, &runner_settings);

            let report = runner.run_scenario(&scenario).await?;
            save_cookies(runner.client(), &settings)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.summary());
            }

            if !report.passed {
                std::process::exit(1);
            }
        }

        Commands::Login {
            email,
            password,
            connection,
        } => {
            let (mut client, settings) = connection.client(base)?;
            let envelope = client.login(&Credentials::new(email, password)).await?;
            save_cookies(&client, &settings)?;

            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.success {
                std::process::exit(1);
            }
            println!("Stored {} cookie(s)", client.jar().len());
        }

        Commands::Request {
            method,
            path,
            body,
            headers,
            connection,
        } => {
            let method = Method::parse(&method)
                .ok_or_else(|| format!("Unsupported method '{}'. Use GET, POST, PUT, PATCH or DELETE", method))?;

            let mut options = RequestOptions::new(method);
            if let Some(body) = body {
                let value: Value = serde_json::from_str(&body)
                    .map_err(|e| format!("Body is not valid JSON: {}", e))?;
                options = options.body(value);
            }
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| format!("Invalid header '{}'. Use 'Name: value'", header))?;
                options = options.header(name.trim(), value.trim());
            }

            let (mut client, settings) = connection.client(base)?;
            let envelope = client.request(&path, options).await?;
            save_cookies(&client, &settings)?;

            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.success {
                std::process::exit(1);
            }
        }

        Commands::Cookies { clear, connection } => {
            let (mut client, settings) = connection.client(base)?;
            if settings.cookie_file.is_none() {
                return Err("No cookie file configured. Pass --cookie-file or set API_HARNESS_COOKIE_FILE".into());
            }

            if clear {
                client.jar_mut().reset();
                save_cookies(&client, &settings)?;
                println!("Cleared cookies");
            } else if client.jar().is_empty() {
                println!("No cookies stored");
            } else {
                for cookie in client.jar().iter() {
                    println!("{}", cookie.to_set_cookie());
                }
            }
        }
    }

    Ok(())
}

/// Parse `key=value` pairs; values that are valid JSON keep their type
fn parse_vars(pairs: &[String]) -> Result<BTreeMap<String, Value>, Box<dyn Error>> {
    let mut vars = BTreeMap::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid variable '{}'. Use KEY=VALUE", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        vars.insert(key.trim().to_string(), value);
    }
    Ok(vars)
}
