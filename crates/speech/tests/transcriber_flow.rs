//! End-to-end transcriber flow, including the mid-task control command.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use voicegate_engine::ConnectionConfig;
use voicegate_speech::{SpeechTranscriber, TranscriberCallbacks, TranscriptionParams};

fn classic_event(name: &str, task_id: &str, payload: Value) -> Message {
    Message::Text(
        json!({
            "header": {
                "namespace": "SpeechTranscriber",
                "name": name,
                "task_id": task_id,
                "message_id": "m-1",
                "appkey": "app"
            },
            "payload": payload
        })
        .to_string(),
    )
}

async fn spawn_gateway() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut sink, mut source) = ws.split();
        while let Some(Ok(message)) = source.next().await {
            match message {
                Message::Text(text) => {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    let name = value["header"]["name"].as_str().unwrap_or_default().to_string();
                    let task_id =
                        value["header"]["task_id"].as_str().unwrap_or_default().to_string();
                    match name.as_str() {
                        "StartTranscription" => {
                            assert_eq!(value["payload"]["max_sentence_silence"], 800);
                            sink.send(classic_event("TranscriptionStarted", &task_id, json!({})))
                                .await
                                .unwrap();
                            sink.send(classic_event(
                                "SentenceBegin",
                                &task_id,
                                json!({"index": 1, "time": 0}),
                            ))
                            .await
                            .unwrap();
                        }
                        "ControlTranscriber" => {
                            sink.send(classic_event(
                                "SentenceEnd",
                                &task_id,
                                json!({"index": 1, "result": "first sentence"}),
                            ))
                            .await
                            .unwrap();
                        }
                        "StopTranscription" => {
                            sink.send(classic_event(
                                "TranscriptionResultChanged",
                                &task_id,
                                json!({"index": 2, "result": "second sen"}),
                            ))
                            .await
                            .unwrap();
                            sink.send(classic_event(
                                "TranscriptionCompleted",
                                &task_id,
                                json!({}),
                            ))
                            .await
                            .unwrap();
                        }
                        _ => {}
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });
    addr
}

#[tokio::test]
async fn transcription_with_sentence_events_and_control() {
    let addr = spawn_gateway().await;
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();

    let begin = tx.clone();
    let end = tx.clone();
    let changed = tx.clone();
    let callbacks = TranscriberCallbacks::new()
        .on_sentence_begin(move |text| {
            begin.send(("sentence_begin".into(), text.to_string())).ok();
        })
        .on_sentence_end(move |text| {
            end.send(("sentence_end".into(), text.to_string())).ok();
        })
        .on_result_changed(move |text| {
            changed.send(("result_changed".into(), text.to_string())).ok();
        });

    let config = ConnectionConfig::with_token(format!("ws://{addr}/ws/v1"), "app", "tok");
    let transcriber = SpeechTranscriber::new(config, callbacks);

    let ready = transcriber
        .start(TranscriptionParams::default(), None)
        .await
        .unwrap();
    assert_eq!(ready.wait(Duration::from_secs(5)).await, Ok(true));

    async fn next(rx: &mut mpsc::UnboundedReceiver<(String, String)>) -> (String, String) {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for callback")
            .expect("callback channel closed")
    }

    let (kind, _) = next(&mut rx).await;
    assert_eq!(kind, "sentence_begin");

    transcriber.send_audio(vec![0u8; 640]).unwrap();

    let mut control = Map::new();
    control.insert("vocabulary_id".into(), Value::String("vocab-2".into()));
    transcriber.control(control).unwrap();

    let (kind, payload) = next(&mut rx).await;
    assert_eq!(kind, "sentence_end");
    assert!(payload.contains("first sentence"));

    let done = transcriber.stop().unwrap();
    assert_eq!(done.wait(Duration::from_secs(5)).await, Ok(true));

    let (kind, payload) = next(&mut rx).await;
    assert_eq!(kind, "result_changed");
    assert!(payload.contains("second sen"));

    transcriber.shutdown();
}
