// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use std::sync::Arc;

// Use library instead of local modules
use policy_dedup::config::DEFAULT_CONFIG_FILE;
use policy_dedup::{
    insert_policies, load_csv, logging, setup_database, verify_count, AppConfig, CheckState,
    DuplicateCheckController, DuplicateResolver, SqlitePolicyStore, UserId,
};

const ENV_USER: &str = "POLICY_DEDUP_USER";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = AppConfig::load(DEFAULT_CONFIG_FILE)?;

    match args.get(1).map(String::as_str) {
        Some("import") => {
            logging::init_stderr(&config.log_filter)?;
            let csv_path = args.get(2).context("usage: policy-dedup import <policies.csv>")?;
            run_import(&config, Path::new(csv_path))
        }
        Some("check") => {
            logging::init_stderr(&config.log_filter)?;
            if args.len() < 4 {
                bail!("usage: policy-dedup check <user-id> <policy-number>");
            }
            // Policy numbers may be typed with spaces
            run_check(&config, UserId::new(args[2].as_str()), &args[3..].join(" "))
        }
        _ => run_ui_mode(&config, &args[1..]),
    }
}

fn run_import(config: &AppConfig, csv_path: &Path) -> Result<()> {
    println!("🗄️  Policy Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let policies = load_csv(csv_path)?;
    println!("✓ Loaded {} policies from CSV", policies.len());

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = rusqlite::Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    setup_database(&conn)?;
    println!("✓ Database initialized with WAL mode");

    // 3. Insert policies
    println!("\n💾 Inserting policies...");
    let inserted = insert_policies(&conn, &policies)?;

    // 4. Verify count
    let count = verify_count(&conn)?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Inserted: {} policies", inserted);
    println!("✓ Already on record: {}", policies.len() - inserted);
    println!("✓ Database contains {} policies", count);

    Ok(())
}

/// Open an imported database; a missing file is an error, never created
fn open_existing_store(db_path: &Path) -> Result<SqlitePolicyStore> {
    if !db_path.exists() {
        bail!(
            "Database not found at {:?}. Run `policy-dedup import <policies.csv>` first.",
            db_path
        );
    }
    SqlitePolicyStore::open(db_path)
}

fn run_check(config: &AppConfig, user: UserId, policy_number: &str) -> Result<()> {
    let store = open_existing_store(&config.database_path)?;
    let resolver = DuplicateResolver::new(Arc::new(store));
    let mut controller = DuplicateCheckController::new(user);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let state = runtime.block_on(controller.check(&resolver, policy_number));

    match state {
        CheckState::Resolved(Some(found)) => {
            println!("⚠️  Policy {} already exists", found.policy_number);
            println!("   Type:    {}", found.policy_type.label());
            if let Some(insurer) = &found.insurer_name {
                println!("   Insurer: {}", insurer);
            }
            println!("   View:    {}", found.link());
        }
        CheckState::Resolved(None) => println!("✓ No existing policy with this number"),
        CheckState::Idle | CheckState::Checking => {
            println!("… Policy number too short to check");
        }
    }

    Ok(())
}

/// `--user <id>` or POLICY_DEDUP_USER
#[cfg_attr(not(feature = "tui"), allow(dead_code))]
fn user_from_args(args: &[String]) -> Option<UserId> {
    args.iter()
        .position(|arg| arg == "--user")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .or_else(|| env::var(ENV_USER).ok())
        .filter(|id| !id.trim().is_empty())
        .map(UserId::new)
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig, args: &[String]) -> Result<()> {
    let user = match user_from_args(args) {
        Some(user) => user,
        None => {
            eprintln!("❌ No user given!");
            eprintln!("   Run: cargo run -- --user <user-id>");
            eprintln!("   or set {}", ENV_USER);
            std::process::exit(1);
        }
    };

    logging::init_file(&config.log_filter, &config.log_file)?;

    println!("🖥️  Loading Policy Duplicate Check UI...\n");

    let store = open_existing_store(&config.database_path)?;
    let resolver = Arc::new(DuplicateResolver::new(Arc::new(store)));
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    let mut app = ui::App::new(user, config.debounce());
    ui::run_ui(&mut app, resolver, runtime.handle())?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig, _args: &[String]) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: policy-dedup check <user-id> <policy-number>");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_from_args() {
        let args = vec!["--user".to_string(), "u1".to_string()];
        assert_eq!(user_from_args(&args), Some(UserId::from("u1")));

        let dangling = vec!["--user".to_string()];
        if env::var(ENV_USER).is_err() {
            assert_eq!(user_from_args(&dangling), None);
        }
    }

    #[test]
    fn test_missing_database_is_not_created() {
        let path = env::temp_dir().join(format!("policy-dedup-missing-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let err = open_existing_store(&path).err().expect("missing database must be refused");
        assert!(err.to_string().contains("Database not found"));
        assert!(!path.exists());
    }

    #[test]
    fn test_existing_database_opens() {
        let path = env::temp_dir().join(format!("policy-dedup-present-{}.db", std::process::id()));
        setup_database(&rusqlite::Connection::open(&path).unwrap()).unwrap();

        assert!(open_existing_store(&path).is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
