// End-to-end replication through a real hub on an ephemeral port

use statesync::config::SyncConfig;
use statesync::host::Host;
use statesync::hub::Hub;
use statesync::{NetworkIdentity, Position};
use statesync_client::{
    ChatCommand, ChatLine, CommandError, DespawnCommand, EntityId, HubConnection, SharedWorld,
    TransformCommand, World,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestHub {
    url: String,
    hub: Arc<Hub>,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<anyhow::Result<()>>,
}

async fn start_hub() -> TestHub {
    let mut config = SyncConfig::default();
    config.server.bind_addr = "127.0.0.1:0".to_string();
    config.hub.drain_timeout_ms = 1000;
    let route = config.server.route.clone();

    let host = Host::bind(config).await.unwrap();
    let addr = host.local_addr().unwrap();
    let hub = host.hub();

    let (shutdown, rx) = oneshot::channel::<()>();
    let server = tokio::spawn(host.run(async move {
        let _ = rx.await;
    }));

    TestHub {
        url: format!("ws://{}{}", addr, route),
        hub,
        shutdown,
        server,
    }
}

struct TestClient {
    connection: Arc<HubConnection>,
    world: SharedWorld,
    player: EntityId,
    transforms: TransformCommand,
    despawns: DespawnCommand,
}

impl TestClient {
    async fn join(url: &str) -> Self {
        let connection = HubConnection::connect(url).await.unwrap();
        let world = World::new().shared();
        let player = world
            .write()
            .unwrap()
            .spawn_networked(Position::default());

        let transforms = TransformCommand::create(connection.clone(), world.clone());
        let despawns = DespawnCommand::create(connection.clone(), world.clone());
        transforms.setup_listeners().unwrap();
        despawns.setup_listeners().unwrap();

        // Registered with the hub once the welcome arrives
        let welcomed = connection.clone();
        eventually(move || welcomed.connection_id().is_some()).await;

        Self {
            connection,
            world,
            player,
            transforms,
            despawns,
        }
    }

    fn identity(&self) -> NetworkIdentity {
        self.world
            .read()
            .unwrap()
            .get(self.player)
            .unwrap()
            .network
            .unwrap()
    }

    fn move_to(&self, position: Position) -> Result<(), CommandError> {
        let entity = {
            let mut world = self.world.write().unwrap();
            let entity = world.get_mut(self.player).unwrap();
            entity.position = position;
            entity.clone()
        };
        self.transforms.send(&entity)
    }

    fn mirror_position(&self, identity: &NetworkIdentity) -> Option<Position> {
        self.world
            .read()
            .unwrap()
            .find_by_identity(identity)
            .filter(|e| e.is_remote())
            .map(|e| e.position)
    }
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_position_reaches_every_other_client() {
    let server = start_hub().await;
    let a = TestClient::join(&server.url).await;
    let b = TestClient::join(&server.url).await;
    let c = TestClient::join(&server.url).await;
    let a_id = a.identity();

    a.move_to(Position::new(1.0, 2.0, 3.0)).unwrap();

    let target = Some(Position::new(1.0, 2.0, 3.0));
    eventually(|| b.mirror_position(&a_id) == target && c.mirror_position(&a_id) == target)
        .await;

    // Sender never mirrors itself
    assert_eq!(a.world.read().unwrap().mirrors().count(), 0);
    assert_eq!(server.hub.records().len(), 3);

    let _ = server.shutdown.send(());
    server.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_late_joiner_receives_snapshot() {
    let server = start_hub().await;
    let a = TestClient::join(&server.url).await;
    let a_id = a.identity();
    a.move_to(Position::new(5.0, 0.0, -5.0)).unwrap();

    let hub = server.hub.clone();
    eventually(move || hub.records().snapshot().len() == 1).await;

    let d = TestClient::join(&server.url).await;
    eventually(|| d.mirror_position(&a_id) == Some(Position::new(5.0, 0.0, -5.0))).await;

    let _ = server.shutdown.send(());
    server.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_disconnect_despawns_mirror() {
    let server = start_hub().await;
    let a = TestClient::join(&server.url).await;
    let b = TestClient::join(&server.url).await;
    let a_id = a.identity();

    a.move_to(Position::new(1.0, 1.0, 1.0)).unwrap();
    eventually(|| b.mirror_position(&a_id).is_some()).await;

    a.connection.close();
    eventually(|| b.mirror_position(&a_id).is_none()).await;

    let hub = server.hub.clone();
    eventually(move || hub.connection_count() == 1 && hub.records().len() == 1).await;

    let _ = server.shutdown.send(());
    server.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_explicit_despawn_keeps_connection() {
    let server = start_hub().await;
    let a = TestClient::join(&server.url).await;
    let b = TestClient::join(&server.url).await;
    let a_id = a.identity();

    a.move_to(Position::new(2.0, 2.0, 2.0)).unwrap();
    eventually(|| b.mirror_position(&a_id).is_some()).await;

    let entity = a.world.read().unwrap().get(a.player).cloned().unwrap();
    a.despawns.send(&entity).unwrap();
    eventually(|| b.mirror_position(&a_id).is_none()).await;

    assert!(a.connection.is_connected());
    assert_eq!(server.hub.connection_count(), 2);

    let _ = server.shutdown.send(());
    server.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let server = start_hub().await;
    let a = TestClient::join(&server.url).await;

    let _ = server.shutdown.send(());
    server.server.await.unwrap().unwrap();

    let connection = a.connection.clone();
    eventually(move || !connection.is_connected()).await;
    assert_eq!(
        a.move_to(Position::new(1.0, 0.0, 0.0)),
        Err(CommandError::ConnectionUnavailable)
    );
    assert_eq!(server.hub.connection_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshot_survives_late_listener_setup() {
    let server = start_hub().await;
    let a = TestClient::join(&server.url).await;
    let a_id = a.identity();
    a.move_to(Position::new(5.0, 0.0, -5.0)).unwrap();

    let hub = server.hub.clone();
    eventually(move || hub.records().snapshot().len() == 1).await;

    // The reader is running; the welcome lands before anything listens
    let connection = HubConnection::connect(&server.url).await.unwrap();
    let welcomed = connection.clone();
    eventually(move || welcomed.connection_id().is_some()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let world = World::new().shared();
    let transforms = TransformCommand::create(connection.clone(), world.clone());
    transforms.setup_listeners().unwrap();

    let mirror = world
        .read()
        .unwrap()
        .find_by_identity(&a_id)
        .map(|e| e.position);
    assert_eq!(mirror, Some(Position::new(5.0, 0.0, -5.0)));

    let _ = server.shutdown.send(());
    server.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_chat_reaches_others() {
    let server = start_hub().await;
    let a = TestClient::join(&server.url).await;
    let b = TestClient::join(&server.url).await;

    let a_chat = ChatCommand::create(a.connection.clone(), a.world.clone());
    let b_chat = ChatCommand::create(b.connection.clone(), b.world.clone());
    a_chat.setup_listeners().unwrap();
    b_chat.setup_listeners().unwrap();

    a_chat.send(&ChatLine::new("a", "hello")).unwrap();
    eventually(|| b.world.read().unwrap().chat_log().count() == 1).await;

    let line = b.world.read().unwrap().chat_log().next().cloned();
    assert_eq!(line, Some(ChatLine::new("a", "hello")));
    assert_eq!(a.world.read().unwrap().chat_log().count(), 0);

    let _ = server.shutdown.send(());
    server.server.await.unwrap().unwrap();
}
