use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use parceldesk_client::{ClientError, ParcelApi, ProfileUpdate, RegisterForm, ScanBuffer};
use parceldesk_config::load as load_config;
use parceldesk_runtime::{shutdown_signal, telemetry, Services};
use parceldesk_timeline::{format_timestamp, Stage, StatusText};
use tokio::io::AsyncReadExt;
use tracing::info;

#[derive(Parser)]
#[command(name = "parceldesk")]
#[command(about = "ParcelDesk client: account, tracking and warehouse scanning")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a Kyrgyz phone number
    Login { phone: String, password: String },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        pickup_point: i64,
        #[arg(long)]
        password: String,
        #[arg(long)]
        password_confirm: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Ask for a password reset e-mail
    ResetPassword { email: String },
    /// Set a new password from the reset link
    ConfirmReset {
        uid: String,
        token: String,
        password: String,
        password_confirm: String,
    },
    /// Client code, pickup point and China warehouse address
    Home,
    /// Change profile fields; omitted fields stay as they are
    Profile {
        #[arg(long)]
        full_name: Option<String>,
        /// Pass an empty value to remove the e-mail
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        pickup_point: Option<i64>,
    },
    /// List pickup points
    PickupPoints {
        #[arg(default_value = "")]
        search: String,
    },
    /// List orders, optionally only one stage (accepted, sent, arrived, done)
    Orders {
        #[arg(long)]
        stage: Option<Stage>,
    },
    /// Order counts per stage
    Stages,
    /// Tracking numbers matching a partial query, local history first
    Find { query: String },
    /// Attach an order to this account, creating it if needed
    Claim { tracking_number: String },
    /// Show the status history of a parcel
    Track { tracking_number: String },
    /// Read scanner input from stdin and register every code
    Scan,
    /// Forget locally remembered tracking numbers
    ClearHistory,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;
    let services = Services::initialise(&config).context("failed to initialise services")?;
    let api = &services.api;

    match cli.command {
        Commands::Login { phone, password } => {
            let outcome = api.login(&phone, &password).await.map_err(explain)?;
            let name = outcome.user.map(|user| user.full_name).unwrap_or_default();
            println!("Signed in {name}");
            println!("Start page: {:?}", outcome.landing);
        }
        Commands::Register {
            full_name,
            phone,
            pickup_point,
            password,
            password_confirm,
        } => {
            let form = RegisterForm {
                full_name,
                phone,
                pickup_point_id: Some(pickup_point),
                password,
                password_confirm,
            };
            api.register(&form).await.map_err(explain)?;
            println!("Account created, signed in");
        }
        Commands::Logout => {
            api.logout().await.map_err(explain)?;
            println!("Signed out");
        }
        Commands::ResetPassword { email } => {
            api.request_password_reset(&email).await.map_err(explain)?;
            println!("Check your inbox for the reset link");
        }
        Commands::ConfirmReset {
            uid,
            token,
            password,
            password_confirm,
        } => {
            api.confirm_password_reset(&uid, &token, &password, &password_confirm)
                .await
                .map_err(explain)?;
            println!("Password changed, sign in with the new one");
        }
        Commands::Home => show_home(api).await?,
        Commands::Profile {
            full_name,
            email,
            pickup_point,
        } => {
            let initial = api.me().await.map_err(explain)?.profile_form();
            let mut edited = initial.clone();
            if let Some(full_name) = full_name {
                edited.full_name = full_name;
            }
            if let Some(email) = email {
                edited.email = Some(email);
            }
            if pickup_point.is_some() {
                edited.pickup_point_id = pickup_point;
            }
            match api.update_profile(&initial, &edited).await.map_err(explain)? {
                ProfileUpdate::Unchanged => println!("Nothing to change"),
                ProfileUpdate::Updated => println!("Profile saved"),
            }
        }
        Commands::PickupPoints { search } => {
            let points = api.pickup_points(&search).await.map_err(explain)?;
            if points.is_empty() {
                println!("No pickup points found");
            }
            for point in points {
                let (city, subtitle) = point.option_text();
                println!("{:>5}  {city}  {subtitle}", point.id.unwrap_or_default());
            }
        }
        Commands::Orders { stage } => {
            let orders = match stage {
                Some(stage) => api.orders_in_stage(stage).await,
                None => api.orders().await,
            }
            .map_err(explain)?;
            if orders.is_empty() {
                println!("No orders found");
            }
            for order in orders {
                println!("{:<24} {}", order.tracking_number, order.status_text().headline);
            }
        }
        Commands::Stages => {
            let counts = api.stage_counts().await.map_err(explain)?;
            for stage in Stage::ALL {
                println!("{:<28} {}", stage.label(), counts.get(stage));
            }
        }
        Commands::Find { query } => {
            let hints = api.find(&query).await.map_err(explain)?;
            for suggestion in api.history().suggestions(&query, &hints) {
                println!("{suggestion}");
            }
        }
        Commands::Claim { tracking_number } => {
            api.claim_or_create(&tracking_number)
                .await
                .map_err(explain)?;
            println!("Order {tracking_number} added to your account");
        }
        Commands::Track { tracking_number } => show_track(api, &tracking_number).await?,
        Commands::Scan => run_scanner(api).await?,
        Commands::ClearHistory => {
            api.history()
                .clear()
                .context("failed to clear tracking history")?;
            println!("Tracking history cleared");
        }
    }

    Ok(())
}

/// Prints per-field problems and turns the error into its user-facing text.
fn explain(error: ClientError) -> anyhow::Error {
    for (field, message) in error.field_errors() {
        eprintln!("  {field}: {message}");
    }
    let message = error.user_message();
    anyhow::Error::new(error).context(message)
}

async fn show_home(api: &ParcelApi) -> anyhow::Result<()> {
    let summary = api.home_summary().await.map_err(explain)?;

    println!("Client code: {}", summary.client_code_display);
    if !summary.client_code_short.is_empty() {
        println!("Short code:  {}", summary.client_code_short);
    }
    if !summary.pickup_text.is_empty() {
        println!("---");
        println!("{}", summary.pickup_text);
    }
    match summary.warehouse {
        Some(warehouse) => {
            println!("--- China warehouse");
            println!("{}", warehouse.address_cn);
            println!("{} {}", warehouse.contact_name, warehouse.contact_phone);
        }
        None => println!("No active China warehouse"),
    }
    Ok(())
}

async fn show_track(api: &ParcelApi, tracking_number: &str) -> anyhow::Result<()> {
    let details = api.track(tracking_number).await.map_err(explain)?;

    println!("{}", details.tracking_number);
    println!("Status: {}", StatusText::parse(&details.last_status).headline);
    println!("---");
    for event in details.newest_first() {
        println!("{}", format_timestamp(&event.timestamp));
        for line in StatusText::parse(&event.status).lines() {
            println!("  {line}");
        }
        if !event.location.is_empty() {
            println!("  {}", event.location);
        }
    }
    Ok(())
}

async fn run_scanner(api: &ParcelApi) -> anyhow::Result<()> {
    println!("Scanner ready. Scan a barcode or type a code and press Enter.");
    println!("Use Ctrl+C or '/quit' to exit");

    let mut stdin = tokio::io::stdin();
    let mut buffer = ScanBuffer::new();
    let mut chunk = [0u8; 512];
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let quiet = until(buffer.deadline());
        let read = tokio::select! {
            _ = &mut shutdown => break,
            _ = quiet => {
                if let Some(code) = buffer.poll(Instant::now()) {
                    submit_scan(api, &code).await;
                }
                continue;
            }
            read = stdin.read(&mut chunk) => read?,
        };
        if read == 0 {
            break;
        }

        let text = String::from_utf8_lossy(&chunk[..read]);
        if text.lines().any(|line| matches!(line.trim(), "/quit" | "/exit" | "/q")) {
            break;
        }
        for code in buffer.feed(&text, Instant::now()) {
            submit_scan(api, &code).await;
        }
    }

    if let Some(code) = buffer.finish() {
        submit_scan(api, &code).await;
    }
    info!("scanner stopped");
    Ok(())
}

/// Resolves at `deadline`, or never when there is nothing pending.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

async fn submit_scan(api: &ParcelApi, code: &str) {
    match api.scan(code).await {
        Ok(outcome) => match outcome.created_event {
            Some(event) => println!("{code}: {}", event.status),
            None => println!("{code}: recorded"),
        },
        Err(error) => eprintln!("{code}: {}", error.user_message()),
    }
}
