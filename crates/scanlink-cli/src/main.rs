//! scanlink - fingerprint scanner fleet service
//!
//! Runs the enrollment lifecycle against an in-process broker and simulated
//! scanner, and inspects the employee directory.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use scanlink_core::{DeviceId, EmployeeId, ServiceConfig};
use scanlink_device::{
    ApiResponse, DeviceRegistry, DeviceService, FingerprintManager, InboundRouter,
    LifecycleConfig, ScannerConfig, SimulatedScanner,
};
use scanlink_notify::{ClientConnection, HubConfig, NotificationHub};
use scanlink_storage::{
    Database, DatabaseConfig, EmployeeDirectory, MemoryEmployeeDirectory, NewEmployee,
    SqliteEmployeeDirectory,
};
use scanlink_transport::InMemoryBroker;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// scanlink - fingerprint scanner fleet service
#[derive(Parser, Debug)]
#[command(name = "scanlink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// SQLite employee database (overrides SCANLINK_DATABASE_PATH)
    #[arg(long)]
    database: Option<String>,

    /// Use an in-memory employee directory instead of SQLite
    #[arg(long)]
    memory: bool,

    /// Topic namespace (overrides SCANLINK_TOPIC_NAMESPACE)
    #[arg(long)]
    namespace: Option<String>,

    /// Delete confirmation timeout in milliseconds (overrides SCANLINK_CONFIRM_TIMEOUT_MS)
    #[arg(long)]
    confirm_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enroll and delete a fingerprint on a simulated scanner
    Demo {
        /// Device id of the simulated scanner
        #[arg(long, default_value = "esp01")]
        device: String,

        /// Employee to enroll (created if missing)
        #[arg(long, default_value_t = 1)]
        employee: i64,

        /// Name used when the employee has to be created
        #[arg(long, default_value = "Demo Employee")]
        name: String,
    },

    /// List employees and their assigned slots
    #[command(alias = "ls")]
    Employees,

    /// Add an employee to the directory
    AddEmployee {
        id: i64,
        name: String,

        #[arg(long, default_value = "employee")]
        role: String,
    },

    /// Print the slot the next enrollment would receive
    NextId,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn service_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::from_env().context("invalid SCANLINK_* environment")?;

    if let Some(database) = &cli.database {
        config = config.database_path(database.clone());
    }
    if let Some(namespace) = &cli.namespace {
        config = config.topic_namespace(namespace.clone());
    }
    if let Some(millis) = cli.confirm_timeout_ms {
        if millis == 0 {
            bail!("--confirm-timeout-ms must be positive");
        }
        config = config.confirm_timeout(Duration::from_millis(millis));
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = service_config(&cli)?;
    info!(
        namespace = ?config.topic_namespace,
        confirm_timeout_ms = config.confirm_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Demo {
            device,
            employee,
            name,
        } => {
            let device = DeviceId::new(device)?;
            let seed = NewEmployee::new(EmployeeId::new(employee), name);

            if cli.memory {
                let directory = Arc::new(MemoryEmployeeDirectory::with_employees([seed])?);
                run_demo(&config, directory, device, EmployeeId::new(employee)).await
            } else {
                let database = open_database(&config).await?;
                let directory = SqliteEmployeeDirectory::new(database.pool().clone());
                if directory.find_by_id(seed.id).await?.is_none() {
                    directory.insert(&seed).await?;
                }
                let result = run_demo(&config, directory, device, EmployeeId::new(employee)).await;
                database.close().await;
                result
            }
        }
        Commands::Employees => {
            let database = open_database(&config).await?;
            let directory = SqliteEmployeeDirectory::new(database.pool().clone());
            for employee in directory.list().await? {
                let slot = employee
                    .fingerprint_id
                    .map_or_else(|| "-".to_string(), |slot| slot.to_string());
                println!(
                    "{:>6}  {:<24} {:<12} {slot}",
                    employee.id.to_string(),
                    employee.full_name,
                    employee.role
                );
            }
            database.close().await;
            Ok(())
        }
        Commands::AddEmployee { id, name, role } => {
            let database = open_database(&config).await?;
            let directory = SqliteEmployeeDirectory::new(database.pool().clone());
            let employee = directory
                .insert(&NewEmployee::new(EmployeeId::new(id), name).role(role))
                .await?;
            println!("Added employee {} ({})", employee.id, employee.full_name);
            database.close().await;
            Ok(())
        }
        Commands::NextId => {
            let database = open_database(&config).await?;
            let directory = SqliteEmployeeDirectory::new(database.pool().clone());
            let assigned = directory.assigned_fingerprint_ids().await?;
            let next = scanlink_device::next_available_id(assigned)?;
            println!("{next}");
            database.close().await;
            Ok(())
        }
    }
}

async fn open_database(config: &ServiceConfig) -> Result<Database> {
    Database::new(DatabaseConfig::from(config))
        .await
        .with_context(|| format!("failed to open {}", config.database_path))
}

async fn run_demo<D: EmployeeDirectory>(
    config: &ServiceConfig,
    directory: D,
    device: DeviceId,
    employee: EmployeeId,
) -> Result<()> {
    let lifecycle = LifecycleConfig::from(config);
    let broker = InMemoryBroker::new();
    let hub = Arc::new(NotificationHub::new(HubConfig::from(config)));

    let manager = Arc::new(FingerprintManager::new(
        broker.clone(),
        directory,
        hub.clone(),
        lifecycle.clone(),
    ));
    let registry = Arc::new(DeviceRegistry::new());
    let router = Arc::new(InboundRouter::new(manager.clone(), registry.clone()));
    let inbound = broker.subscribe(router.filters());
    let router_task = router.clone().spawn(inbound.into_receiver());

    let scanner = SimulatedScanner::spawn(
        &broker,
        device.clone(),
        lifecycle.scheme.clone(),
        ScannerConfig::default(),
    );
    scanner.announce();

    let mut client = hub.connect();
    hub.handle_client_event(client.id, "subscribe_employee", json!({ "employeeID": employee.get() }))?;

    let service = DeviceService::new(manager, registry);

    print_response("ping", &service.ping(&device).await)?;
    print_response("enroll", &service.enroll(&device, employee).await)?;
    wait_for_enrollment(&mut client).await;

    print_response("next_available_id", &service.next_available_id().await)?;
    print_response("finger_count", &service.finger_count(&device).await)?;
    print_response(
        "delete_and_confirm",
        &service.delete_and_confirm(&device, employee).await,
    )?;
    print_response("device", &service.device(&device))?;

    drop(scanner);
    router_task.abort();
    info!(stats = ?router.stats(), "Demo finished");
    Ok(())
}

async fn wait_for_enrollment(client: &mut ClientConnection) {
    let wait = async {
        while let Some(message) = client.recv().await {
            println!("event {} {}", message.event, message.data);
            if matches!(message.event.as_str(), "enroll_success" | "enroll_failure") {
                break;
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(5), wait).await.is_err() {
        println!("no enrollment result within 5s");
    }
}

fn print_response(operation: &str, response: &ApiResponse) -> Result<()> {
    println!("{operation}: {}", serde_json::to_string_pretty(response)?);
    Ok(())
}
