//! LdapBridge command-line management tool.
//!
//! Provides subcommands for generating and validating configuration files,
//! dry-running identity reconciliation, authenticating against the directory,
//! and inspecting the local user and group store.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ldapbridge_core::config::AppConfig;
use ldapbridge_core::db::Database;
use ldapbridge_core::directory::{DirectoryPrincipal, LdapAuthenticator};
use ldapbridge_core::identity::{IdentityReconciler, Reconciliation};
use ldapbridge_core::store::UserStore;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// LdapBridge command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "ldapbridge",
    version,
    about = "Reconcile LDAP identities with local users and groups"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/ldapbridge/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./ldapbridge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Reconcile a principal without contacting the directory.
    Map {
        /// Login name of the principal.
        username: String,

        /// Authority claim granted to the principal (repeatable).
        #[arg(long = "claim")]
        claims: Vec<String>,

        /// Directory attribute as name=value (repeatable).
        #[arg(long = "attr")]
        attributes: Vec<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Bind against the directory and reconcile the authenticated user.
    Login {
        /// Login name.
        username: String,

        /// Read the password from this environment variable instead of prompting.
        #[arg(long)]
        password_env: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect local users.
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Inspect local groups.
    Groups {
        #[command(subcommand)]
        action: GroupsAction,
    },
}

#[derive(Subcommand, Debug)]
enum UsersAction {
    /// List all local users.
    List,
    /// Show one user with its groups and properties.
    Show {
        /// Username.
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum GroupsAction {
    /// List all local groups.
    List,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        command => {
            // Everything else needs the config and the store
            let config = load_config(&cli.config)?;
            let db = Arc::new(open_database(&config)?);

            match command {
                Commands::Map {
                    username,
                    claims,
                    attributes,
                    json,
                } => cmd_map(&config, db, &username, claims, &attributes, json),
                Commands::Login {
                    username,
                    password_env,
                    json,
                } => cmd_login(&config, db, &username, password_env.as_deref(), json),
                Commands::Users { action } => cmd_users(&db, action),
                Commands::Groups { action } => cmd_groups(&db, action),
                Commands::Init { .. } | Commands::Validate => unreachable!(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path).context("failed to load configuration file")
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let db_path = config.store.database_path();
    let db = if config.store.read_only {
        Database::open_read_only(&db_path).context("failed to open database read-only")?
    } else {
        let db = Database::new(&db_path).context("failed to open database")?;
        db.initialize().context("failed to initialize database")?;
        db
    };
    Ok(db.with_hash_cost(config.store.credential_hash_cost))
}

fn reconciler(config: &AppConfig, db: Arc<Database>) -> IdentityReconciler {
    IdentityReconciler::new(Arc::new(config.properties()), db.clone(), db)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# LdapBridge Configuration
# See documentation for all available options.

[store]
data_dir = "/var/lib/ldapbridge"
database_file = "ldapbridge.db"
read_only = false

[ldap]
url = "ldap://ldap.example.com:389"
user_base_dn = "ou=people,dc=example,dc=com"
user_filter = "(uid={0})"
# group_base_dn = "ou=groups,dc=example,dc=com"
# group_filter = "(member={0})"
# group_role_attribute = "cn"
bind_dn = "cn=ldapbridge,ou=services,dc=example,dc=com"
bind_password_env = "LDAP_BIND_PASSWORD"
starttls = false
timeout_secs = 10

# Reconciliation policy. Keys are dotted below `auth.`; quote them so that
# `user.enable` and `user.enable.session` can coexist.
[auth]
"group.create" = true
"user.create" = true
"user.enable" = true
"user.enable.session" = false
"authenticate.only" = false
"group.update" = false
"user.mapping.attributes" = false
"user.mapping.store" = false
"user.mapping.email" = "mail"
"group.assign.default" = false
# "group.default" = "portal-users"

# Directory claim -> local group names. Spaces in claims become dots.
[auth.group.mapping]
"Domain.Admins" = ["portal-admins"]
"Domain.Users" = ["portal-users"]
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your directory details");
    println!("  2. Set the referenced environment variable (LDAP_BIND_PASSWORD)");
    println!(
        "  3. Validate with: ldapbridge validate --config {}",
        output.display()
    );
    println!(
        "  4. Try a mapping: ldapbridge map jdoe --claim \"Domain Admins\" --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    let props = config.properties();
    let mappings = props
        .keys()
        .filter(|k| k.starts_with("auth.group.mapping."))
        .count();

    println!();
    println!("Configuration summary:");
    println!("  LDAP URL       : {}", config.ldap.url);
    println!("  User base DN   : {}", config.ldap.user_base_dn);
    println!(
        "  Group base DN  : {}",
        config
            .ldap
            .group_base_dn
            .as_deref()
            .unwrap_or("(memberOf)")
    );
    println!(
        "  Bind DN        : {}",
        config.ldap.bind_dn.as_deref().unwrap_or("(anonymous)")
    );
    println!(
        "  Bind password  : {}",
        if config.ldap.bind_password.is_some() {
            "set"
        } else {
            "NOT SET"
        }
    );
    println!("  Database       : {}", config.store.database_path().display());
    println!("  Read-only      : {}", config.store.read_only);
    println!("  Auth settings  : {}", props.len());
    println!("  Claim mappings : {}", mappings);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_map(
    config: &AppConfig,
    db: Arc<Database>,
    username: &str,
    claims: Vec<String>,
    attributes: &[String],
    json: bool,
) -> Result<()> {
    let mut principal = DirectoryPrincipal::new(username);
    for claim in claims {
        principal.add_claim(claim);
    }
    for attr in attributes {
        let (name, value) = attr
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid attribute '{}': expected name=value", attr))?;
        principal = principal.with_attribute(name.trim(), value);
    }

    let result = reconciler(config, db)
        .reconcile(&principal)
        .context("identity reconciliation failed")?;
    print_reconciliation(&result, json)
}

fn cmd_login(
    config: &AppConfig,
    db: Arc<Database>,
    username: &str,
    password_env: Option<&str>,
    json: bool,
) -> Result<()> {
    let password = match password_env {
        Some(var) => std::env::var(var)
            .with_context(|| format!("environment variable '{}' is not set", var))?,
        None => dialoguer::Password::new()
            .with_prompt(format!("LDAP password for {}", username))
            .interact()
            .context("failed to read password")?,
    };

    let principal = LdapAuthenticator::new(config.ldap.clone())
        .authenticate(username, &password)
        .context("directory authentication failed")?;

    let result = reconciler(config, db)
        .reconcile(&principal)
        .context("identity reconciliation failed")?;
    print_reconciliation(&result, json)
}

fn print_reconciliation(result: &Reconciliation, json: bool) -> Result<()> {
    let user = result.user.get();

    if json {
        let value = serde_json::json!({
            "created": result.user.was_created(),
            "user": user,
            "groups": result
                .groups
                .iter()
                .map(|g| serde_json::json!({
                    "name": g.get().name,
                    "created": g.was_created(),
                }))
                .collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("failed to encode result")?
        );
        return Ok(());
    }

    println!(
        "User: {} ({})",
        user.username,
        if result.user.was_created() {
            "created"
        } else {
            "existing"
        }
    );
    println!("  Enabled : {}", user.enabled);
    println!("  Email   : {}", user.email().unwrap_or("-"));
    println!("  Groups  : {}", user.group_names().join(", "));

    let created = result.created_groups();
    if !created.is_empty() {
        println!("  New groups: {}", created.join(", "));
    }

    Ok(())
}

fn cmd_users(db: &Database, action: UsersAction) -> Result<()> {
    match action {
        UsersAction::List => {
            let users = db.list_users().context("failed to list users")?;

            if users.is_empty() {
                println!("No users found.");
                return Ok(());
            }

            println!(
                "{:<24} {:<8} {:<7} {:<26}",
                "USERNAME", "ENABLED", "GROUPS", "UPDATED"
            );
            println!("{}", "-".repeat(68));

            for u in &users {
                println!(
                    "{:<24} {:<8} {:<7} {:<26}",
                    truncate(&u.username, 24),
                    u.enabled,
                    u.group_count,
                    u.updated_at,
                );
            }

            println!();
            println!("{} user(s) shown", users.len());
            Ok(())
        }

        UsersAction::Show { name } => {
            let user = db
                .get_user(&name)
                .with_context(|| format!("failed to load user '{}'", name))?;

            println!("User: {}", user.username);
            println!("======{}", "=".repeat(user.username.len()));
            println!();
            println!("  Enabled : {}", user.enabled);
            println!("  Groups  :");
            for group in &user.groups {
                println!("    - {} ({})", group.name, group.role);
            }
            if !user.properties.is_empty() {
                println!("  Properties:");
                for (key, value) in &user.properties {
                    println!("    {} = {}", key, value.as_str());
                }
            }
            Ok(())
        }
    }
}

fn cmd_groups(db: &Database, action: GroupsAction) -> Result<()> {
    match action {
        GroupsAction::List => {
            let groups = db.list_groups().context("failed to list groups")?;

            if groups.is_empty() {
                println!("No groups found.");
                return Ok(());
            }

            println!(
                "{:<24} {:<8} {:<8} DESCRIPTION",
                "NAME", "ROLE", "MEMBERS"
            );
            println!("{}", "-".repeat(80));

            for g in &groups {
                println!(
                    "{:<24} {:<8} {:<8} {}",
                    truncate(&g.name, 24),
                    g.role.as_str(),
                    g.member_count,
                    truncate(&g.description, 38),
                );
            }

            println!();
            println!("{} group(s) shown", groups.len());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
