use anyhow::{Context, Result};
use rand::Rng;
use statesync::Position;
use statesync_client::{
    ChatCommand, ChatLine, CommandError, DespawnCommand, HubConnection, TransformCommand, World,
};
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_URL: &str = "ws://127.0.0.1:4222/state-sync";
const TICK: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statesync_client=info".into()),
        )
        .init();

    let url = std::env::var("STATESYNC_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    info!(url = %url, "State-sync demo client starting...");

    let connection = HubConnection::connect(&url)
        .await
        .context("Failed to reach state-sync hub")?;

    let world = World::new().shared();
    let transforms = TransformCommand::create(connection.clone(), world.clone());
    let despawns = DespawnCommand::create(connection.clone(), world.clone());
    let chat = ChatCommand::create(connection.clone(), world.clone());
    transforms.setup_listeners()?;
    despawns.setup_listeners()?;
    chat.setup_listeners()?;

    let user = std::env::var("STATESYNC_USER").unwrap_or_else(|_| "demo".to_string());
    chat.send(&ChatLine::new(user.as_str(), "joined"))?;

    let player = world
        .write()
        .unwrap_or_else(|p| p.into_inner())
        .spawn_networked(Position::default());

    let mut interval = tokio::time::interval(TICK);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let entity = {
                    let mut world = world.write().unwrap_or_else(|p| p.into_inner());
                    let Some(entity) = world.get_mut(player) else {
                        error!("Player entity vanished");
                        break;
                    };
                    let mut rng = rand::thread_rng();
                    entity.position.x += rng.gen_range(-0.5..=0.5);
                    entity.position.z += rng.gen_range(-0.5..=0.5);
                    entity.clone()
                };

                match transforms.send(&entity) {
                    Ok(()) => {}
                    Err(CommandError::ConnectionUnavailable) => {
                        warn!("Hub connection lost");
                        break;
                    }
                    Err(e) => error!(error = %e, "Failed to send transform"),
                }

                ticks += 1;
                if ticks % 50 == 0 {
                    let (mirrors, chat_lines) = {
                        let world = world.read().unwrap_or_else(|p| p.into_inner());
                        (world.mirrors().count(), world.chat_log().count())
                    };
                    info!(mirrors = mirrors, chat_lines = chat_lines, "Replication status");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    if connection.is_connected() {
        let entity = world
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(player)
            .cloned();
        if let Some(entity) = entity {
            if let Err(e) = despawns.send(&entity) {
                warn!(error = %e, "Failed to announce despawn");
            }
        }
    }
    connection.close();
    // Let the writer flush the despawn and close frame
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("State-sync demo client stopped");
    Ok(())
}
