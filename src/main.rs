// src/main.rs
use actix_web::{App, HttpServer, middleware::Logger};
use clap::{Parser, Subcommand};
use lms_backend::auth;
use lms_backend::config::{Config, StorageKind};
use lms_backend::db::{PgStorage, Storage};
use lms_backend::gateway::StripeClient;
use lms_backend::mailer::SmtpMailer;
use lms_backend::memory::InMemoryStorage;
use lms_backend::models::MODERATORS_GROUP;
use lms_backend::tasks::{self, RetryPolicy, TaskContext, TaskQueue};
use lms_backend::{AppServices, configure_app, course_cache};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "lms_backend")]
#[command(about = "Courses, lessons, subscriptions and payments over a JSON API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server with its task worker and monthly scheduler
    Serve,
    /// Create a staff superuser account
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Add an existing user to the moderators group
    AddModerator {
        #[arg(long)]
        email: String,
    },
    /// Deactivate users who have not logged in for the given number of days
    DeactivateInactive {
        #[arg(long)]
        days: Option<i64>,
    },
}

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>, Box<dyn std::error::Error>> {
    match config.storage {
        StorageKind::Postgres => Ok(Arc::new(PgStorage::connect(&config.database_url).await?)),
        StorageKind::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on shutdown");
            Ok(Arc::new(InMemoryStorage::new()))
        }
    }
}

async fn add_moderator(store: &dyn Storage, email: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut user = store
        .get_user_by_email(&email.trim().to_lowercase())
        .await?
        .ok_or_else(|| format!("no user with email {}", email))?;
    if user.in_group(MODERATORS_GROUP) {
        tracing::info!("{} is already a moderator", user.email);
        return Ok(());
    }
    user.groups.push(MODERATORS_GROUP.to_string());
    store.update_user(&user).await?;
    tracing::info!("Added {} to {}", user.email, MODERATORS_GROUP);
    Ok(())
}

async fn serve(config: Config, store: Arc<dyn Storage>) -> Result<(), Box<dyn std::error::Error>> {
    let mailer = Arc::new(SmtpMailer::from_config(&config)?);
    let (queue, receiver) = TaskQueue::channel();
    let ctx = Arc::new(TaskContext {
        store: store.clone(),
        mailer,
        site_name: config.site_name.clone(),
        retry: RetryPolicy::from_config(&config),
    });
    tokio::spawn(tasks::run_worker(ctx, receiver));
    tokio::spawn(tasks::run_monthly_scheduler(
        queue.clone(),
        config.inactive_days,
    ));

    let services = AppServices {
        gateway: Arc::new(StripeClient::from_config(&config)),
        course_cache: course_cache(&config),
        tasks: queue,
        store,
        config: config.clone(),
    };

    tracing::info!("Listening on {}:{}", config.bind_addr, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(|cfg| configure_app(cfg, &services))
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store = open_storage(&config).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            tracing::info!("Starting LMS backend");
            serve(config, store).await
        }
        Commands::CreateSuperuser { email, password } => {
            auth::create_superuser(store.as_ref(), &config, &email, &password).await?;
            Ok(())
        }
        Commands::AddModerator { email } => add_moderator(store.as_ref(), &email).await,
        Commands::DeactivateInactive { days } => {
            let days = days.unwrap_or(config.inactive_days);
            let count =
                tasks::deactivate_inactive_users(store.as_ref(), days, chrono::Utc::now()).await?;
            println!("Deactivated {} users", count);
            Ok(())
        }
    }
}
