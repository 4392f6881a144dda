//! AtlasKV Server Binary
//!
//! Process entry point: parses CLI flags, builds a `Config`, opens the
//! engine, wires up replication for the configured role, and runs the TCP
//! ingestion façade and the HTTP façade until the process is killed.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use atlaskv::config::{Role, WalSyncStrategy};
use atlaskv::engine::ReplicationSink;
use atlaskv::http::HttpFacade;
use atlaskv::network::Server as TcpServer;
use atlaskv::replication::{ReplicationClient, ReplicationServer, ReplicationStatusProvider};
use atlaskv::{Config, Engine};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RoleArg {
    Primary,
    Backup,
    Standalone,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SyncPolicyArg {
    Sync,
    Interval,
    None,
}

#[derive(Parser, Debug)]
#[command(name = "atlaskv-server")]
#[command(about = "Durable key-value store with WAL/MemTable/SSTable storage and primary->backup replication")]
struct Args {
    /// Replication role this instance plays.
    #[arg(long, value_enum, default_value = "standalone")]
    role: RoleArg,

    /// Port the HTTP façade listens on.
    #[arg(long, default_value_t = 6379)]
    http_port: u16,

    /// Port the TCP streaming ingestion façade listens on.
    #[arg(long, default_value_t = 6380)]
    tcp_port: u16,

    /// Backup role: port the replication server listens on.
    #[arg(long)]
    replication_port: Option<u16>,

    /// Primary role: host of the backup's replication server.
    #[arg(long)]
    backup_host: Option<String>,

    /// Primary role: port of the backup's replication server.
    #[arg(long)]
    backup_port: Option<u16>,

    /// Directory for all data files.
    #[arg(long, default_value = "./atlaskv_data")]
    data_dir: String,

    /// WAL fsync policy.
    #[arg(long, value_enum, default_value = "interval")]
    sync_policy: SyncPolicyArg,

    /// MemTable flush threshold, in bytes.
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    memtable_size: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let wal_sync_strategy = match args.sync_policy {
        SyncPolicyArg::Sync => WalSyncStrategy::EveryWrite,
        SyncPolicyArg::Interval => WalSyncStrategy::IntervalMs(100),
        SyncPolicyArg::None => WalSyncStrategy::Never,
    };
    let role = match args.role {
        RoleArg::Primary => Role::Primary,
        RoleArg::Backup => Role::Backup,
        RoleArg::Standalone => Role::Standalone,
    };

    let mut builder = Config::builder()
        .data_dir(&args.data_dir)
        .role(role)
        .wal_sync_strategy(wal_sync_strategy)
        .memtable_size_limit(args.memtable_size)
        .listen_addr(format!("0.0.0.0:{}", args.tcp_port))
        .http_addr(format!("0.0.0.0:{}", args.http_port));
    if let Some(port) = args.replication_port {
        builder = builder.replication_addr(format!("0.0.0.0:{port}"));
    }
    if let (Some(host), Some(port)) = (&args.backup_host, args.backup_port) {
        builder = builder.backup_addr(format!("{host}:{port}"));
    }
    let config = builder.build();

    if matches!(role, Role::Primary) && config.backup_addr.is_none() {
        tracing::error!("--role=primary requires --backup-host and --backup-port");
        return ExitCode::from(1);
    }

    let engine = match Engine::open(config.clone()) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(error = %e, "failed to open engine");
            return ExitCode::from(1);
        }
    };

    let replication = match role {
        Role::Standalone => Arc::new(ReplicationStatusProvider::Disabled),
        Role::Primary => match ReplicationClient::connect(&config) {
            Ok(client) => {
                engine.attach_replication_sink(Arc::clone(&client) as Arc<dyn ReplicationSink>);
                Arc::new(ReplicationStatusProvider::Primary(client))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start replication client");
                return ExitCode::from(1);
            }
        },
        Role::Backup => {
            let server = Arc::new(ReplicationServer::new(
                config.replication_addr.clone(),
                Arc::clone(&engine),
            ));
            let run_server = Arc::clone(&server);
            let spawned = std::thread::Builder::new()
                .name("atlaskv-replication-server".into())
                .spawn(move || {
                    if let Err(e) = run_server.run() {
                        tracing::error!(error = %e, "replication server stopped");
                    }
                });
            if let Err(e) = spawned {
                tracing::error!(error = %e, "failed to spawn replication server thread");
                return ExitCode::from(1);
            }
            Arc::new(ReplicationStatusProvider::Backup(server))
        }
    };

    let http_engine = Arc::clone(&engine);
    let http_replication = Arc::clone(&replication);
    let http_addr = config.http_addr.clone();
    let http_handle = std::thread::Builder::new()
        .name("atlaskv-http".into())
        .spawn(move || {
            let facade = HttpFacade::new(http_engine, http_replication);
            if let Err(e) = facade.run(&http_addr) {
                tracing::error!(error = %e, "http facade stopped");
            }
        });
    let http_handle = match http_handle {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to spawn http facade thread");
            return ExitCode::from(1);
        }
    };

    tracing::info!(
        role = ?args.role,
        http_addr = %config.http_addr,
        tcp_addr = %config.listen_addr,
        "atlaskv server starting"
    );

    let mut tcp_server = TcpServer::new(config, Arc::clone(&engine));
    match tcp_server.run() {
        Ok(()) => {
            let _ = http_handle.join();
            ExitCode::from(0)
        }
        Err(e) => {
            tracing::error!(error = %e, "tcp ingestion facade stopped unexpectedly");
            ExitCode::from(2)
        }
    }
}
