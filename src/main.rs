use chatroom::entity::{Group, InMemoryEntityStore, User};
use chatroom::message::{MessagePipeline, PipelineOptions, RawMessage};
use chatroom::navigation::TracingRouter;
use chatroom::room::InMemoryHistoryLoader;
use chatroom::{
    ChatConfig, ChatContext, ChatError, CloseOutcome, InMemoryMessageBus, LoopbackConfig,
    LoopbackRealtime, MessageBus, RoomRegistry, Topic,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SELF_ADDRESS: &str = "me@example.com";
const PERSON_ADDRESS: &str = "ada@example.com";
const GROUP_ADDRESS: &str = "abc@conference.example.com";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ChatError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatroom=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting chat room demo");

    let config = ChatConfig::from_env();
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryMessageBus::with_capacity(config.topic_capacity));

    let entity_store = Arc::new(InMemoryEntityStore::new().with_latency(Duration::from_millis(30)));
    entity_store.insert_user(User::new(SELF_ADDRESS, "Me")).await;
    entity_store.insert_user(User::new(PERSON_ADDRESS, "Ada Lovelace")).await;
    entity_store
        .insert_group(Group::new(GROUP_ADDRESS, "Planning"))
        .await;

    let history_pipeline = MessagePipeline::new(
        entity_store.clone(),
        PipelineOptions {
            resolve_historical_senders: config.resolve_historical_senders,
        },
    );
    let history_loader = Arc::new(InMemoryHistoryLoader::new(
        Arc::new(history_pipeline),
        config.live_timestamp_format.clone(),
    ));
    history_loader
        .seed(
            "abc",
            vec![
                RawMessage::from_payload(json!({
                    "id": "h1",
                    "from": PERSON_ADDRESS,
                    "to": GROUP_ADDRESS,
                    "time": 1_704_103_200_000_i64,
                    "raw": "Agenda is up"
                }))?,
                RawMessage::from_payload(json!({
                    "id": "h2",
                    "from": PERSON_ADDRESS,
                    "to": GROUP_ADDRESS,
                    "time": 1_704_103_260_000_i64,
                    "raw": "Please add your items"
                }))?,
            ],
        )
        .await;

    // Stand-in for the realtime backend
    let loopback = LoopbackRealtime::start(
        bus.clone(),
        LoopbackConfig {
            join_latency: Duration::from_millis(120),
            room_info_latency: Duration::from_millis(60),
            send_latency: Duration::from_millis(40),
            jitter: Duration::from_millis(25),
            self_address: SELF_ADDRESS.to_string(),
        },
    );
    loopback.set_subject("abc", "Quarterly planning").await;

    let context = ChatContext::new(
        bus.clone(),
        entity_store,
        history_loader,
        Arc::new(TracingRouter),
        config,
    );
    let registry = RoomRegistry::new(&context);
    registry.bind_to_events();

    bus.publish(
        &Topic::OpenRoom.to_string(),
        json!({ "jid": PERSON_ADDRESS, "rawSubject": null }),
    );

    let (person, group) = tokio::try_join!(
        registry.open(PERSON_ADDRESS),
        registry.open(GROUP_ADDRESS)
    )?;
    info!(
        room_id = %group.id(),
        subject = ?group.subject(),
        messages = group.message_count(),
        "Group room ready"
    );

    let sent = registry
        .lifecycle()
        .send_message(&group, "Added mine", None)
        .await?;
    info!(message_id = %sent.id, pending = group.pending_messages().len(), "Message delivered");

    registry.lifecycle().invite_to_room(&group, PERSON_ADDRESS);

    if let CloseOutcome::Navigated(next) = registry.close(&group) {
        info!(room_id = %next.id(), "Now showing");
    }
    if let CloseOutcome::NoRoomsOpen = registry.close(&person) {
        info!("All rooms closed");
    }

    registry.unbind_events();
    loopback.stop();
    Ok(())
}
