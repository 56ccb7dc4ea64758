use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use rc2fa_core::directory::{DEFAULT_MONGO_DATABASE, DEFAULT_MONGO_URI};
use rc2fa_core::prelude::*;
use rc2fa_core::types::{DEFAULT_ALERT_COLOR, DEFAULT_BOT_NAME, DEFAULT_IGNORED_ROLES};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("rc2fa-check")
        .version(rc2fa_core::VERSION)
        .about("Remind Rocket.Chat users without 2FA and report them to admins")
        .arg(
            Arg::new("webhook-url")
                .long("webhook-url")
                .required(true)
                .help("Rocket.Chat incoming webhook URL"),
        )
        .arg(
            Arg::new("mongo-connection")
                .short('m')
                .long("mongo-connection")
                .default_value(DEFAULT_MONGO_URI)
                .help("MongoDB connection string"),
        )
        .arg(
            Arg::new("mongo-db")
                .long("mongo-db")
                .default_value(DEFAULT_MONGO_DATABASE)
                .help("Rocket.Chat database name"),
        )
        .arg(
            Arg::new("storage-path")
                .short('s')
                .long("storage-path")
                .default_value("storage.db")
                .value_parser(clap::value_parser!(PathBuf))
                .help("File holding notification history"),
        )
        .arg(
            Arg::new("ignore-user")
                .short('u')
                .long("ignore-user")
                .action(ArgAction::Append)
                .help("Username to skip (repeatable)"),
        )
        .arg(
            Arg::new("ignore-role")
                .short('t')
                .long("ignore-role")
                .action(ArgAction::Append)
                .default_values(DEFAULT_IGNORED_ROLES.iter().copied())
                .help("Role whose members are skipped (repeatable)"),
        )
        .arg(
            Arg::new("admin-notification-target")
                .short('a')
                .long("admin-notification-target")
                .action(ArgAction::Append)
                .help("Channel or @user receiving the report (repeatable)"),
        )
        .arg(
            Arg::new("bot-name")
                .long("bot-name")
                .default_value(DEFAULT_BOT_NAME)
                .help("Sender name shown on messages"),
        )
        .arg(
            Arg::new("alert-color")
                .long("alert-color")
                .default_value(DEFAULT_ALERT_COLOR)
                .help("Attachment color"),
        )
        .arg(
            Arg::new("dry-run")
                .short('n')
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Only check, don't notify"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn strings(args: &ArgMatches, id: &str) -> Vec<String> {
    args.get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

async fn run(args: &ArgMatches) -> anyhow::Result<bool> {
    let webhook_url = args
        .get_one::<String>("webhook-url")
        .context("--webhook-url is required")?;
    let storage_path = args
        .get_one::<PathBuf>("storage-path")
        .context("--storage-path is required")?;

    let mongo = MongoConfig {
        uri: args
            .get_one::<String>("mongo-connection")
            .cloned()
            .unwrap_or_else(|| DEFAULT_MONGO_URI.to_string()),
        database: args
            .get_one::<String>("mongo-db")
            .cloned()
            .unwrap_or_else(|| DEFAULT_MONGO_DATABASE.to_string()),
    };

    let mut config = CheckerConfig::new()
        .with_ignored_users(strings(args, "ignore-user"))
        .with_ignored_roles(strings(args, "ignore-role"))
        .with_admin_targets(strings(args, "admin-notification-target"))
        .with_dry_run(args.get_flag("dry-run"));
    if let Some(name) = args.get_one::<String>("bot-name") {
        config = config.with_bot_name(name);
    }
    if let Some(color) = args.get_one::<String>("alert-color") {
        config = config.with_alert_color(color);
    }

    let directory = MongoDirectory::connect(&mongo)
        .await
        .context("failed to set up MongoDB client")?;
    let webhook = RocketChatWebhook::new(WebhookConfig::new(webhook_url))
        .context("failed to set up webhook client")?;
    let store = JsonFileRepository::new(storage_path);

    tracing::info!(
        "Checking {} (store: {}, dry run: {})",
        mongo.database,
        storage_path.display(),
        config.dry_run
    );

    let checker = TwoFactorChecker::new(
        config,
        Arc::new(directory),
        Arc::new(webhook),
        Arc::new(store),
    );

    checker
        .check_and_notify()
        .await
        .context("2FA check cycle failed")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = cli().get_matches();
    init_tracing(args.get_flag("log-json"));

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            tracing::warn!("Some notifications could not be delivered");
            ExitCode::from(1)
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
