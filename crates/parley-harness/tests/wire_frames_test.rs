//! Snapshot of the frames a typical session writes to the socket.

#![allow(clippy::unwrap_used)]

use parley_client::ClientEvent;
use parley_harness::{SimEnv, SimServer, settle, sim_runtime};

const CHAT: u64 = 5;

#[tokio::test]
async fn session_frames() {
    let env = SimEnv::new();
    let mut server = SimServer::new();
    server.post(CHAT, 2, "one");
    server.post(CHAT, 2, "two");
    let mut runtime = sim_runtime(&env, server);

    runtime.step(ClientEvent::SignIn { user_id: 1 }).await.unwrap();
    settle(&mut runtime).await.unwrap();
    runtime.step(ClientEvent::OpenChat { chat_id: CHAT }).await.unwrap();
    settle(&mut runtime).await.unwrap();

    let incoming = runtime.driver_mut().server_mut().post(CHAT, 2, "three");
    runtime.driver_mut().inject_server(incoming);
    settle(&mut runtime).await.unwrap();

    runtime.step(ClientEvent::SetTyping { chat_id: CHAT, is_typing: true }).await.unwrap();
    runtime.step(ClientEvent::DeleteMessage { chat_id: CHAT, message_id: 1000 }).await.unwrap();
    runtime.step(ClientEvent::RequestPresence { user_ids: vec![2] }).await.unwrap();
    settle(&mut runtime).await.unwrap();
    runtime.step(ClientEvent::SignOut).await.unwrap();

    let frames: Vec<_> =
        runtime.driver_mut().take_sent().iter().map(|command| command.encode().unwrap()).collect();

    insta::assert_snapshot!(frames.join("\n"), @r#"
    {"event":"authenticate","data":1}
    {"event":"bulk_mark_read","data":{"chat_id":5,"message_ids":[1001,1000]}}
    {"event":"message_delivered","data":{"message_id":1002}}
    {"event":"message_read","data":{"chat_id":5,"message_id":1002}}
    {"event":"typing","data":{"chat_id":5,"is_typing":true}}
    {"event":"delete_message","data":{"chat_id":5,"message_id":1000}}
    {"event":"get_presence","data":[2]}
    {"event":"typing","data":{"chat_id":5,"is_typing":false}}
    {"event":"disconnect","data":null}
    "#);
}
