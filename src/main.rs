//! iSCSI Target Operator CLI
//!
//! Command-line front door for the orchestrator: create and delete
//! highly-available iSCSI targets, list them with their aggregated health,
//! or host the REST API.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use iscsi_target_operator::{
    ApiServer, ApiServerConfig, CibAdminConfig, CibAdminStore, ClusterOverview, CreateRequest,
    Error, LinstorClient, LinstorConfig, Orchestrator, Result, EXIT_SUCCESS,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// iSCSI Target Operator - HA iSCSI targets over replicated block storage
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Storage controller REST endpoint
    #[arg(long, env = "LINSTOR_CONTROLLER", default_value = "http://localhost:3370")]
    controller: String,

    /// Cluster configuration administration command
    #[arg(long, env = "CIBADMIN", default_value = "cibadmin")]
    cibadmin: String,

    /// Timeout for cluster store and storage controller calls, seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30")]
    timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a highly-available iSCSI target and logical unit
    Create {
        /// Full IQN, e.g. "iqn.2020-01.com.example:disk0"
        #[arg(long)]
        iqn: String,

        /// Logical unit number
        #[arg(long, default_value = "0")]
        lun: u8,

        /// Volume size in KiB
        #[arg(long)]
        size_kib: u64,

        /// Nodes holding a replica of the backing volume
        #[arg(long, required = true, num_args = 1..)]
        storage_nodes: Vec<String>,

        /// Additional diskless nodes eligible to run the target
        #[arg(long, num_args = 0..)]
        client_nodes: Vec<String>,

        /// Floating service address clients connect to
        #[arg(long)]
        service_ip: String,

        /// CHAP username
        #[arg(long)]
        username: Option<String>,

        /// CHAP password
        #[arg(long)]
        password: Option<String>,

        /// Comma-separated portal list
        #[arg(long)]
        portals: Option<String>,
    },

    /// Delete an iSCSI logical unit and its backing volume
    Delete {
        /// Full IQN of the target
        #[arg(long)]
        iqn: String,

        /// Logical unit number
        #[arg(long, default_value = "0")]
        lun: u8,
    },

    /// List iSCSI targets with their aggregated health
    List,

    /// Host the REST API
    Serve {
        /// REST API bind address
        #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
        api_addr: String,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);

    let code = match run(args).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<()> {
    let cluster = Arc::new(CibAdminStore::new(CibAdminConfig {
        command: args.cibadmin.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    }));
    let storage = Arc::new(LinstorClient::new(LinstorConfig {
        endpoint: args.controller.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    })?);
    let orchestrator = Orchestrator::new(cluster, storage);

    match args.command {
        Command::Create {
            iqn,
            lun,
            size_kib,
            storage_nodes,
            client_nodes,
            service_ip,
            username,
            password,
            portals,
        } => {
            orchestrator
                .create_target(CreateRequest {
                    iqn: iqn.clone(),
                    lun,
                    size_kib,
                    storage_nodes,
                    client_nodes,
                    service_ip,
                    username,
                    password,
                    portals,
                })
                .await?;
            println!("Created target {} LUN {}", iqn, lun);
            Ok(())
        }

        Command::Delete { iqn, lun } => {
            orchestrator.delete_target(&iqn, lun).await?;
            println!("Deleted target {} LUN {}", iqn, lun);
            Ok(())
        }

        Command::List => {
            let overview = orchestrator.list_targets().await?;
            print_overview(&overview);
            Ok(())
        }

        Command::Serve { api_addr } => {
            let config = ApiServerConfig {
                rest_addr: api_addr
                    .parse()
                    .map_err(|e| Error::Configuration(format!("Invalid API address: {}", e)))?,
            };
            let server = ApiServer::new(config, orchestrator);

            info!("Starting iSCSI Target Operator v{}", iscsi_target_operator::VERSION);
            server.run().await
        }
    }
}

// =============================================================================
// List Output
// =============================================================================

fn print_overview(overview: &ClusterOverview) {
    println!("Cluster resources:");
    println!("  iSCSI targets:");
    print_names(&overview.target_primitives);
    println!("  iSCSI logical units:");
    print_names(&overview.logical_units);
    println!("Other cluster resources:");
    if overview.other_resources.is_empty() {
        println!("  No resources");
    } else {
        for name in &overview.other_resources {
            println!("  {}", name);
        }
    }
    println!();

    if overview.allocated_tids.is_empty() {
        println!("No TIDs allocated");
    } else {
        println!("Allocated TIDs:");
        for tid in &overview.allocated_tids {
            println!("  {}", tid);
        }
    }
    match overview.next_free_tid {
        Some(tid) => println!("Next free TID:\n  {}", tid),
        None => println!("No free TIDs"),
    }
    println!();

    println!("Target health:");
    for target in &overview.targets {
        println!(
            "  {} ({})",
            target.name,
            target.iqn.as_deref().unwrap_or("unknown IQN")
        );
        println!(
            "    target: {}, service address: {}",
            target.target_state, target.service_ip_state
        );
        for lun in &target.luns {
            println!(
                "    lun {}: {} (volume {})",
                lun.lun, lun.verdict, lun.volume_state
            );
        }
    }
}

fn print_names(names: &[String]) {
    if names.is_empty() {
        println!("    No resources");
    } else {
        for name in names {
            println!("    {}", name);
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("tower=warn".parse().unwrap())
        .add_directive("axum=info".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
