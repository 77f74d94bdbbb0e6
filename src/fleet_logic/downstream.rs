//! WebSocket transport. Each accepted socket gets its own send queue,
//! registers with the subscriber registry for its lifetime, and forwards
//! queued readings until the peer goes away.

use crate::fleet_logic::config::{Config, DEFAULT_PORT};
use crate::fleet_logic::state::{AppState, CLIENT_QUEUE_CAPACITY};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc};

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

pub async fn run(config: Config, app_state: AppState, mut shutdown: broadcast::Receiver<()>) {
    let app = router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port.unwrap_or(DEFAULT_PORT)));
    log::info!("Broadcast server listening on {}", addr);

    if let (Some(cert_path), Some(key_path)) = (config.tls_cert_path, config.tls_key_path) {
        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .expect("Failed to load TLS configuration");

        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .unwrap();
    } else {
        let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await.ok();
                log::info!("Broadcast server shutting down.");
            })
            .await
            .unwrap();
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn health_handler() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "OK")
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
    state.register(client_id, tx);
    log::info!("Client {} connected", client_id);

    loop {
        tokio::select! {
            // Subscribers send no commands; we only watch for the close.
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            line = rx.recv() => {
                match line {
                    Some(line) => {
                        if socket.send(Message::Text(line.as_ref().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.unregister(client_id);
    log::info!("Client {} disconnected", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet_logic::model::Reading;
    use crate::fleet_logic::simulator::generate_batch;
    use crate::fleet_logic::store::NoopStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::time::Duration;

    async fn spawn_server(state: AppState) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn wait_for_clients(state: &AppState, expected: usize) {
        for _ in 0..100 {
            if state.client_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry never reached {expected} client(s)");
    }

    #[tokio::test]
    async fn connected_client_receives_stamped_readings() {
        let state = AppState::new(Arc::new(NoopStore));
        let addr = spawn_server(state.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        wait_for_clients(&state, 1).await;

        let mut rng = StdRng::seed_from_u64(3);
        let batch = generate_batch(1, 1_754_000_000_000, &mut rng);
        let report = state.broadcast(&batch);
        assert!(report.faulted.is_empty());

        for expected in &batch {
            let msg = ws.next().await.unwrap().unwrap();
            let text = msg.into_text().unwrap();
            let received: Reading = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(received.device_id, expected.device_id);
            assert_eq!(received.payload, expected.payload);
            assert!(received.data_status.is_some());
        }
    }

    #[tokio::test]
    async fn disconnect_unregisters_the_client() {
        let state = AppState::new(Arc::new(NoopStore));
        let addr = spawn_server(state.clone()).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        wait_for_clients(&state, 1).await;

        ws.close(None).await.unwrap();
        wait_for_clients(&state, 0).await;
    }
}
