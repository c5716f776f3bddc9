//! Thutorium relay server binary.

use clap::Parser;

use thutorium_relay::{app, DisconnectNotify, RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "thutorium-relay",
    version,
    about = "Thutorium call signaling relay"
)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5001, env = "RELAY_PORT")]
    port: u16,

    /// Allowed browser origin for CORS ("*" for any)
    #[arg(long, default_value = "http://localhost:3000", env = "RELAY_CORS_ORIGIN")]
    cors_origin: String,

    /// Who is told when a connection drops
    #[arg(
        long,
        value_enum,
        default_value_t = DisconnectNotify::Broadcast,
        env = "RELAY_DISCONNECT_NOTIFY"
    )]
    disconnect_notify: DisconnectNotify,

    /// Refuse connections that do not supply a userId
    #[arg(long, default_value_t = false, env = "RELAY_REQUIRE_USER_ID")]
    require_user_id: bool,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false, env = "RELAY_LOG_JSON")]
    log_json: bool,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "thutorium_relay=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = RelayConfig {
        port: args.port,
        cors_origin: args.cors_origin,
        disconnect_notify: args.disconnect_notify,
        require_user_id: args.require_user_id,
    };

    tracing::info!(
        cors_origin = config.cors_origin.as_str(),
        disconnect_notify = config.disconnect_notify.as_str(),
        require_user_id = config.require_user_id,
        "Relay configured"
    );

    let state = RelayState::new(config);
    let router = app(state);

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Thutorium relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Relay stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["thutorium-relay"]).unwrap();
        assert_eq!(args.port, 5001);
        assert_eq!(args.cors_origin, "http://localhost:3000");
        assert_eq!(args.disconnect_notify, DisconnectNotify::Broadcast);
        assert!(!args.require_user_id);
    }

    #[test]
    fn test_peer_notify_flag() {
        let args =
            Args::try_parse_from(["thutorium-relay", "--disconnect-notify", "peer", "-p", "6000"])
                .unwrap();
        assert_eq!(args.port, 6000);
        assert_eq!(args.disconnect_notify, DisconnectNotify::Peer);
    }
}
