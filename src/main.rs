use std::collections::HashMap;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use serde_json::{json, Value};

use r8r_mintlify::client::{HttpMethod, MintlifyClient};
use r8r_mintlify::config::Config;
use r8r_mintlify::credentials::{CredentialStore, MintlifyCredentials};
use r8r_mintlify::nodes::{NodeContext, NodeRegistry};

const NODE_TYPE: &str = "mintlify";
const DEFAULT_CREDENTIAL: &str = "mintlify";

#[derive(Parser)]
#[command(name = "r8r-mintlify")]
#[command(about = "Drive the Mintlify documentation agent from the command line", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an agent job that updates documentation on a branch
    UpdateDocs {
        /// Git branch the agent works on
        #[arg(short, long, default_value = "main")]
        branch: String,
        /// Instructions for the agent
        #[arg(short, long)]
        prompt: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Get the status of an agent job
    GetJob {
        /// Job id returned by update-docs
        job_id: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Make a custom request against the Mintlify API
    Request {
        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: HttpMethod,
        /// Path below the API base ({{ credentials.project_id }} is substituted)
        #[arg(short, long, default_value = "/agent/{{ credentials.project_id }}/jobs")]
        endpoint: String,
        /// Query parameters (name=value)
        #[arg(short, long = "query", value_parser = parse_var)]
        query: Vec<(String, String)>,
        /// JSON body (sent for POST, PUT and PATCH)
        #[arg(long)]
        body: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Run the node with a raw JSON config over JSON input items
    Run {
        /// Node config as JSON
        #[arg(short, long)]
        config: String,
        /// Input as JSON (an array runs once per element)
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Manage credentials
    Credentials {
        #[command(subcommand)]
        action: CredentialActions,
    },
    /// List available node types
    Nodes,
    /// Print the JSON schema of a node config
    Schema {
        /// Node type
        #[arg(default_value = NODE_TYPE)]
        node_type: String,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Credential name
    #[arg(long, default_value = DEFAULT_CREDENTIAL)]
    credential: String,
    /// Record failures in the output instead of exiting with an error
    #[arg(long)]
    continue_on_fail: bool,
    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

impl CommonArgs {
    fn apply(&self, config: &mut Value) {
        config["credential"] = json!(self.credential);
        config["continue_on_fail"] = json!(self.continue_on_fail);
        if let Some(timeout) = self.timeout {
            config["timeout_seconds"] = json!(timeout);
        }
    }
}

#[derive(Subcommand)]
enum CredentialActions {
    /// Store an API key and project id under a name
    Set {
        /// Credential name
        #[arg(default_value = DEFAULT_CREDENTIAL)]
        name: String,
        /// Mintlify API key (or read from stdin)
        #[arg(short = 'k', long)]
        api_key: Option<String>,
        /// Mintlify project id
        #[arg(short, long)]
        project_id: String,
    },
    /// List stored credentials
    List,
    /// Delete a credential
    Delete {
        /// Credential name
        name: String,
    },
    /// Check a credential against the API
    Test {
        /// Credential name
        #[arg(default_value = DEFAULT_CREDENTIAL)]
        name: String,
    },
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid variable format '{}'. Expected name=value", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    r8r_mintlify::telemetry::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::UpdateDocs {
            branch,
            prompt,
            common,
        } => cmd_update_docs(&branch, &prompt, &common).await?,
        Commands::GetJob { job_id, common } => cmd_get_job(&job_id, &common).await?,
        Commands::Request {
            method,
            endpoint,
            query,
            body,
            common,
        } => cmd_request(method, &endpoint, &query, body.as_deref(), &common).await?,
        Commands::Run { config, input } => cmd_run(&config, input.as_deref()).await?,
        Commands::Credentials { action } => match action {
            CredentialActions::Set {
                name,
                api_key,
                project_id,
            } => cmd_credentials_set(&name, api_key.as_deref(), &project_id).await?,
            CredentialActions::List => cmd_credentials_list().await?,
            CredentialActions::Delete { name } => cmd_credentials_delete(&name).await?,
            CredentialActions::Test { name } => cmd_credentials_test(&name).await?,
        },
        Commands::Nodes => cmd_nodes(),
        Commands::Schema { node_type } => cmd_schema(&node_type)?,
        Commands::Completions { shell } => {
            cmd_completions(shell)?;
        }
    }

    Ok(())
}

/// Shell completion variants
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum CompletionShell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

/// Generate shell completions
fn cmd_completions(shell: CompletionShell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let shell: Shell = shell.into();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}

fn cmd_nodes() {
    let registry = NodeRegistry::new();
    for (node_type, description) in registry.descriptions() {
        println!("{:<16} {}", node_type, description);
    }
}

fn cmd_schema(node_type: &str) -> anyhow::Result<()> {
    let registry = NodeRegistry::new();
    let node = registry.get(node_type).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown node type '{}'. Available: {}",
            node_type,
            registry.list().join(", ")
        )
    })?;
    let schema = node
        .config_schema()
        .ok_or_else(|| anyhow::anyhow!("Node '{}' does not publish a config schema", node_type))?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

// ============================================================================
// Node Commands
// ============================================================================

/// Credentials for a run: the store, with the environment pair taking
/// precedence under `name`.
async fn resolve_credentials(name: &str) -> anyhow::Result<HashMap<String, MintlifyCredentials>> {
    let mut credentials = CredentialStore::load().await?.resolved();
    if let Some(from_env) = MintlifyCredentials::from_env()? {
        credentials.insert(name.to_string(), from_env);
    }
    Ok(credentials)
}

async fn run_node(config: &Value, input: Value) -> anyhow::Result<Vec<Value>> {
    let credential = config
        .get("credential")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CREDENTIAL);

    let ctx = NodeContext::new(&chrono::Utc::now().timestamp_millis().to_string(), "cli")
        .with_credentials(resolve_credentials(credential).await?)
        .with_input(input);

    let registry = NodeRegistry::new();
    let result = match registry.execute(NODE_TYPE, config, &ctx).await {
        Ok(result) => result,
        Err(err) => {
            // Structured error on stdout; the process still exits non-zero
            println!("{}", serde_json::to_string_pretty(&err.to_json())?);
            return Err(err.into());
        }
    };

    Ok(match result.data {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Print the output of a single-item run.
fn print_single(outputs: Vec<Value>) -> anyhow::Result<()> {
    let output = outputs.into_iter().next().unwrap_or(Value::Null);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_update_docs(branch: &str, prompt: &str, common: &CommonArgs) -> anyhow::Result<()> {
    let mut config = json!({
        "operation": "update_docs",
        "branch": branch,
        "prompt": prompt,
    });
    common.apply(&mut config);

    print_single(run_node(&config, Value::Null).await?)
}

async fn cmd_get_job(job_id: &str, common: &CommonArgs) -> anyhow::Result<()> {
    let mut config = json!({
        "operation": "get_job",
        "job_id": job_id,
    });
    common.apply(&mut config);

    print_single(run_node(&config, Value::Null).await?)
}

async fn cmd_request(
    method: HttpMethod,
    endpoint: &str,
    query: &[(String, String)],
    body: Option<&str>,
    common: &CommonArgs,
) -> anyhow::Result<()> {
    let query_parameters: Vec<Value> = query
        .iter()
        .map(|(name, value)| json!({"name": name, "value": value}))
        .collect();

    let mut config = json!({
        "operation": "custom_request",
        "method": method,
        "endpoint": endpoint,
        "query_parameters": query_parameters,
        "send_body": body.is_some(),
    });
    if let Some(body) = body {
        config["body"] = json!(body);
    }
    common.apply(&mut config);

    print_single(run_node(&config, Value::Null).await?)
}

async fn cmd_run(config: &str, input: Option<&str>) -> anyhow::Result<()> {
    let config: Value = serde_json::from_str(config)
        .map_err(|e| anyhow::anyhow!("Invalid --config JSON: {}", e))?;
    let input: Value = match input {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("Invalid --input JSON: {}", e))?,
        None => Value::Null,
    };

    let outputs = run_node(&config, input).await?;
    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}

// ============================================================================
// Credentials Commands
// ============================================================================

async fn cmd_credentials_set(
    name: &str,
    api_key: Option<&str>,
    project_id: &str,
) -> anyhow::Result<()> {
    use std::io::{self, BufRead};

    // Get the key from the argument or stdin
    let api_key = match api_key {
        Some(k) => k.to_string(),
        None => {
            eprintln!("Enter Mintlify API key (or pipe from stdin):");
            let stdin = io::stdin();
            let mut line = String::new();
            stdin.lock().read_line(&mut line)?;
            line.trim().to_string()
        }
    };

    let credentials = MintlifyCredentials::new(&api_key, project_id)?;

    let mut store = CredentialStore::load().await?;
    store.set(name, &credentials).await?;

    println!("✓ Credential '{}' saved", name);
    println!("  Project: {}", credentials.project_id());

    Ok(())
}

async fn cmd_credentials_list() -> anyhow::Result<()> {
    let store = CredentialStore::load().await?;
    let credentials = store.list();

    if credentials.is_empty() {
        println!("No credentials stored.");
        println!();
        println!("Add one with: r8r-mintlify credentials set <name> -k <api-key> -p <project-id>");
        return Ok(());
    }

    println!(
        "{:<20} {:<24} {:<16} {:<20}",
        "NAME", "PROJECT", "API KEY", "UPDATED"
    );
    println!("{}", "-".repeat(80));

    for cred in credentials {
        let updated = cred.updated_at.format("%Y-%m-%d %H:%M");
        let masked = match store.get(&cred.name) {
            Ok(Some(decrypted)) => CredentialStore::mask_value(decrypted.api_key().expose()),
            _ => "<unreadable>".to_string(),
        };
        println!(
            "{:<20} {:<24} {:<16} {:<20}",
            cred.name, cred.project_id, masked, updated
        );
    }

    Ok(())
}

async fn cmd_credentials_delete(name: &str) -> anyhow::Result<()> {
    let mut store = CredentialStore::load().await?;
    let deleted = store.delete(name).await?;

    if deleted {
        println!("✓ Credential '{}' deleted", name);
    } else {
        println!("Credential '{}' not found", name);
    }

    Ok(())
}

async fn cmd_credentials_test(name: &str) -> anyhow::Result<()> {
    let credentials = resolve_credentials(name).await?;
    let credentials = credentials.get(name).ok_or_else(|| {
        anyhow::anyhow!(
            "Credential '{}' not found. Add it with: r8r-mintlify credentials set {}",
            name,
            name
        )
    })?;

    let config = Config::load();
    let client = MintlifyClient::new(&config.mintlify)?;

    match client.test_credentials(credentials).await {
        Ok(()) => {
            println!("✓ Credential '{}' is valid", name);
            Ok(())
        }
        Err(e) => anyhow::bail!("Credential '{}' failed: {}", name, e.external_message()),
    }
}
