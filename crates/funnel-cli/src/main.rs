// ============================================================================
// funnel-admin - CLI for the funnel admin dashboard
// ============================================================================
// Usage:
//   funnel-admin login [--password PW]         Open an admin session (2h)
//   funnel-admin status                        Show backend/session status
//   funnel-admin leads [--search S] [--tier T] [--status S] [--asc]
//   funnel-admin analytics                     Session stats and funnel
//   funnel-admin weekly                        Last-7-days report
//   funnel-admin set-status <ID> <STATUS>      Change a lead's status
//   funnel-admin delete <ID>                   Delete a lead
//   funnel-admin capture-lead --url ... --email ... --phone ... --tier ...
//   funnel-admin book --email ... --date ... --time ... --session-id ...
//   funnel-admin export --format json          Export leads and analytics
// ============================================================================

use anyhow::{bail, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use funnel_core::dashboard::{
    funnel_counts, AnalyticsSummary, LeadFilter, SortOrder, WeeklySummary, FUNNEL_STEPS,
};
use funnel_core::{
    generate_session_id, AdminAuth, BookingInput, EmailNotifier, FunnelConfig, LeadInput,
    LeadStatus, LocalStore, PersistenceGateway,
};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Funnel admin dashboard tool
#[derive(Parser)]
#[command(name = "funnel-admin", version, about = "Manage funnel leads, bookings and analytics")]
struct Cli {
    /// Path to the local store (default: ~/.funnel/funnel.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an admin session
    Login {
        /// Admin password (prompted on stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Close the admin session
    Logout,

    /// Show backend mode, store location and admin session state
    Status,

    /// List leads with optional filters
    Leads {
        /// Case-insensitive match on email or session id
        #[arg(long)]
        search: Option<String>,

        /// Revenue tier filter (substring match)
        #[arg(long)]
        tier: Option<String>,

        /// Filter by status: pending, contacted, audit_delivered, closed
        #[arg(long)]
        status: Option<String>,

        /// Oldest first
        #[arg(long)]
        asc: bool,
    },

    /// All-time session stats and funnel drop-off
    Analytics,

    /// Last-7-days report with projected pipeline value
    Weekly,

    /// Change a lead's status
    SetStatus { id: String, status: String },

    /// Delete a lead
    Delete { id: String },

    /// Record a lead from the audit form
    CaptureLead {
        #[arg(long)]
        url: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        tier: String,
        #[arg(long)]
        problem: Option<String>,
        #[arg(long)]
        source: Option<String>,
        /// Correlation token (generated when omitted)
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Book a strategy session
    Book {
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        date: String,
        #[arg(long)]
        time: String,
        #[arg(long)]
        session_id: String,
    },

    /// Export leads and analytics
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn format_duration(secs: u64) -> String {
    format!("{}m {}s", secs / 60, secs % 60)
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("funnel_core=info".parse()?)
                .add_directive("funnel_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = FunnelConfig::from_env();
    if cli.db_path.is_some() {
        config.db_path = cli.db_path;
    }

    let store = Arc::new(LocalStore::open(config.db_path.as_deref())?);
    let gateway = PersistenceGateway::from_config(&config, store.clone());
    let auth = AdminAuth::new(store.clone(), config.admin_password_sha256.clone());

    match cli.command {
        Commands::Login { password } => cmd_login(&auth, password),
        Commands::Logout => {
            auth.logout();
            println!("Logged out.");
            Ok(())
        }
        Commands::Status => cmd_status(&config, &store, &gateway, &auth),
        Commands::CaptureLead {
            url,
            email,
            phone,
            tier,
            problem,
            source,
            session_id,
        } => {
            let input = LeadInput {
                session_id: session_id.unwrap_or_else(generate_session_id),
                target_url: url,
                user_email: email,
                user_phone: phone,
                revenue_tier: tier,
                core_problem: problem,
                cta_source: source,
            };
            cmd_capture_lead(&config, &gateway, input).await
        }
        Commands::Book {
            email,
            phone,
            date,
            time,
            session_id,
        } => {
            let input = BookingInput {
                email,
                phone,
                date,
                time,
                session_id,
            };
            cmd_book(&config, &gateway, input).await
        }

        // Dashboard commands
        Commands::Leads {
            search,
            tier,
            status,
            asc,
        } => {
            require_admin(&auth)?;
            let status = status
                .as_deref()
                .map(str::parse::<LeadStatus>)
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let filter = LeadFilter {
                search,
                tier,
                status,
                order: if asc { SortOrder::Asc } else { SortOrder::Desc },
            };
            cmd_leads(&gateway, &filter).await
        }
        Commands::Analytics => {
            require_admin(&auth)?;
            cmd_analytics(&gateway).await
        }
        Commands::Weekly => {
            require_admin(&auth)?;
            cmd_weekly(&gateway).await
        }
        Commands::SetStatus { id, status } => {
            require_admin(&auth)?;
            let status: LeadStatus = status.parse().map_err(anyhow::Error::msg)?;
            gateway.update_lead_status(&id, status).await?;
            println!("Lead {} -> {}", id, status);
            Ok(())
        }
        Commands::Delete { id } => {
            require_admin(&auth)?;
            gateway.delete_lead(&id).await?;
            println!("Deleted lead {}", id);
            Ok(())
        }
        Commands::Export { format } => {
            require_admin(&auth)?;
            cmd_export(&gateway, &format).await
        }
    }
}

fn require_admin(auth: &AdminAuth) -> Result<()> {
    if !auth.is_authenticated() {
        bail!("Admin session required. Run `funnel-admin login` first.");
    }
    Ok(())
}

fn cmd_login(auth: &AdminAuth, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            print!("Password: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if !auth.login(&password) {
        bail!("Login failed");
    }
    if let Some(expiry) = auth.session_expiry() {
        println!("Logged in. Session expires {}", format_timestamp(&expiry));
    }
    Ok(())
}

fn cmd_status(
    config: &FunnelConfig,
    store: &LocalStore,
    gateway: &PersistenceGateway,
    auth: &AdminAuth,
) -> Result<()> {
    println!("=== Funnel Status ===");
    if gateway.backend_available() {
        println!("Backend:  {}", config.backend_url);
    } else {
        println!("Backend:  not configured (local-only)");
    }
    match store.path() {
        Some(path) => println!("Store:    {}", path.display()),
        None => println!("Store:    in-memory"),
    }
    println!(
        "Email:    {}",
        if EmailNotifier::from_config(config).is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );
    match (auth.is_authenticated(), auth.session_expiry()) {
        (true, Some(expiry)) => println!("Admin:    logged in until {}", format_timestamp(&expiry)),
        _ => println!("Admin:    logged out"),
    }
    Ok(())
}

async fn cmd_leads(gateway: &PersistenceGateway, filter: &LeadFilter) -> Result<()> {
    let leads = filter.apply(&gateway.get_leads().await?);

    if leads.is_empty() {
        println!("No leads found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<9}  {:<16}  {:<15}  {:<8}  {}",
        "ID", "SESSION", "CREATED", "STATUS", "TIER", "EMAIL"
    );
    println!("{}", "-".repeat(110));

    for lead in &leads {
        println!(
            "{:<36}  {:<9}  {:<16}  {:<15}  {:<8}  {}",
            lead.id,
            lead.session_id,
            format_timestamp(&lead.created_at),
            lead.status,
            lead.revenue_tier,
            lead.user_email
        );
    }

    println!("\nTotal: {} leads", leads.len());
    Ok(())
}

async fn cmd_analytics(gateway: &PersistenceGateway) -> Result<()> {
    let records = gateway.get_analytics().await?;
    let summary = AnalyticsSummary::from_records(&records);

    println!("=== Session Analytics ===");
    println!("Sessions:        {}", summary.total_sessions);
    println!("Avg duration:    {}", format_duration(summary.avg_duration_secs));
    println!("Completion rate: {}%", summary.completion_rate);
    println!("WhatsApp rate:   {}%", summary.whatsapp_rate);
    println!();
    println!("Funnel:");
    for (step, count) in funnel_counts(&records, FUNNEL_STEPS) {
        println!("  step {}  {}", step, count);
    }
    Ok(())
}

async fn cmd_weekly(gateway: &PersistenceGateway) -> Result<()> {
    let records = gateway.get_analytics().await?;
    let leads = gateway.get_leads().await?;
    let weekly = WeeklySummary::compute(&records, &leads, Utc::now());

    println!("=== Weekly Report ===");
    println!("Visitors:          {}", weekly.total_visitors);
    println!("Avg session:       {}", format_duration(weekly.avg_duration_secs));
    println!("CTA trigger rate:  {}%", weekly.cta_rate);
    println!(
        "Form submissions:  {} ({}% conversion)",
        weekly.form_submissions, weekly.conversion_percentage
    );
    println!("WhatsApp:          {}", weekly.whatsapp_count);
    println!("Calendly:          {}", weekly.calendly_count);
    println!("Projected revenue: ${}", weekly.projected_revenue);
    Ok(())
}

async fn cmd_capture_lead(
    config: &FunnelConfig,
    gateway: &PersistenceGateway,
    input: LeadInput,
) -> Result<()> {
    let lead = gateway.save_lead(input).await?;
    println!("Captured lead {} ({})", lead.session_id, lead.id);

    if let Some(notifier) = EmailNotifier::from_config(config) {
        if let Err(e) = notifier.notify_lead(&lead).await {
            warn!("Lead notification failed: {}", e);
        }
    }
    Ok(())
}

async fn cmd_book(
    config: &FunnelConfig,
    gateway: &PersistenceGateway,
    input: BookingInput,
) -> Result<()> {
    let booking = gateway.save_booking(input).await?;
    println!(
        "Session locked: {} at {} for {}",
        booking.date, booking.time, booking.email
    );

    if let Some(notifier) = EmailNotifier::from_config(config) {
        if let Err(e) = notifier.notify_booking(&booking).await {
            warn!("Booking notification failed: {}", e);
        }
    }
    Ok(())
}

async fn cmd_export(gateway: &PersistenceGateway, format: &str) -> Result<()> {
    if format != "json" {
        bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let leads = gateway.get_leads().await?;
    let analytics = gateway.get_analytics().await?;

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "summary": AnalyticsSummary::from_records(&analytics),
        "leads": leads,
        "analytics": analytics,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}
