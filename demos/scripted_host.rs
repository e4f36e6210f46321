use remote_channel::{
    Channel, ChannelTransport, ChannelTransportConfig, ObjectDefinition, OutgoingMessage,
    Transport, callback,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Answers `initialize` with a `greeter` object and replies to `greet` calls.
fn run_host(host: &Arc<ChannelTransport>) {
    let replies = host.clone();
    host.set_message_handler(Arc::new(move |text: &str| {
        let Ok(message) = serde_json::from_str::<OutgoingMessage>(text) else {
            eprintln!("[Host] Ignoring {}", text);
            return;
        };

        let reply = match message {
            OutgoingMessage::Initialize { .. } => {
                let greeter = ObjectDefinition::new()
                    .with_method("greet", 1)
                    .with_property("greetings", json!(0))
                    .with_signal("greeted", vec![json!("QString")]);
                vec![json!({ "greeter": greeter, "self": ObjectDefinition::new() })]
            }
            OutgoingMessage::InvokeMethod { args, id, .. } => {
                let name = args.first().and_then(|a| a.as_str()).unwrap_or("stranger").to_string();
                let mut out = vec![
                    json!({"type": "signal", "object": "greeter", "signal": "greeted", "args": [name]}),
                    json!({"type": "propertyUpdate", "data": {"greeter": {"greetings": [1]}}}),
                ];
                if let Some(id) = id {
                    out.push(json!({"type": "response", "id": id, "data": format!("Hello, {}!", name)}));
                }
                out
            }
        };

        for message in reply {
            if let Err(e) = replies.send(&message.to_string()) {
                eprintln!("[Host] Send failed: {}", e);
            }
        }
    }));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (client, host) =
        ChannelTransport::create_pair("demo", ChannelTransportConfig::default());
    let (client, host) = (Arc::new(client), Arc::new(host));

    run_host(&host);
    let _host_loop = host.spawn_delivery(Duration::from_millis(5));
    let _client_loop = client.spawn_delivery(Duration::from_millis(5));

    let channel = Channel::connect(
        client.clone(),
        Some(Box::new(|_: &Channel| println!("[Client] Channel connected"))),
    )?;

    let ready = Arc::new(tokio::sync::Notify::new());
    let notify = ready.clone();
    channel.on_objects_ready(callback(move |_| notify.notify_one()));
    ready.notified().await;
    println!("[Client] Objects: {:?}", channel.object_names());

    let greeter = channel
        .object("greeter")
        .ok_or("host did not announce `greeter`")?;
    greeter.connect(
        "greeted",
        callback(|args| println!("[Client] Signal greeted{:?}", args)),
    )?;
    greeter.connect_property(
        "greetings",
        callback(|args| println!("[Client] greetings changed to {:?}", args)),
    )?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    greeter.call_with_callback("greet", vec![json!("world")], move |data| {
        let _ = tx.send(data);
    })?;

    let response = tokio::time::timeout(Duration::from_secs(1), rx).await??;
    println!("[Client] Response: {}", response);
    println!("{}", client.stats().unwrap_or_default());

    Ok(())
}
