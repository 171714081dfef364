//! Browser counter demo: one circuit per visitor, kept alive across
//! page reloads and dropped connections.
//!
//! Run with: cargo run -p counter-server-demo
//!
//! Then open http://localhost:3000 in your browser. Reload the page or
//! kill the tab's network and the count picks up where it left off.

use std::{
    hash::{DefaultHasher, Hash, Hasher},
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{Router, response::Html, routing::get};
use live_circuits_core::{CircuitHost, CircuitId};
use live_circuits_interop::{ByteBufferRegistry, codec};
use live_circuits_transport::{
    CallArg, CircuitEndpoint, CircuitFactory, CircuitFault, CircuitOptions, ClientProxy,
    OutboundCall, RemoteCircuit, circuit_router,
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A per-visitor counter living on the server.
struct CounterCircuit {
    client: ClientProxy,
    count: Mutex<i64>,
}

impl CounterCircuit {
    fn render(&self) {
        let count = *self.count.lock().unwrap();
        self.client
            .invoke(OutboundCall::new("render", vec![CallArg::Json(json!(count))]));
    }
}

impl CircuitHost for CounterCircuit {}

#[async_trait]
impl RemoteCircuit for CounterCircuit {
    async fn on_invoke(
        &self,
        method: &str,
        args: &[Value],
        buffers: &ByteBufferRegistry,
    ) -> Result<(), CircuitFault> {
        match method {
            "increment" => {
                let delta = args.first().and_then(Value::as_i64).unwrap_or(1);
                *self.count.lock().unwrap() += delta;
                self.render();
                Ok(())
            }
            "upload" => {
                let arg = args
                    .first()
                    .ok_or_else(|| CircuitFault::new("upload needs a buffer argument"))?;
                let buffer = codec::decode_value(buffers, arg)?;
                let mut hasher = DefaultHasher::new();
                buffer.as_slice().hash(&mut hasher);
                let digest = format!("{:016x}", hasher.finish());
                // Return the bytes along with the digest so the page can
                // see buffers travel both ways.
                self.client.invoke(OutboundCall::new(
                    "digest",
                    vec![
                        CallArg::Json(json!(buffer.len())),
                        CallArg::Json(json!(digest)),
                        CallArg::Buffer(buffer),
                    ],
                ));
                Ok(())
            }
            "crash" => Err(CircuitFault::new("deliberate crash requested by the page")),
            other => Err(CircuitFault::new(format!("Unknown method {other}"))),
        }
    }

    fn client(&self) -> ClientProxy {
        self.client.clone()
    }

    fn on_client_attached(&self) {
        // Repaint on every (re)connect so a resumed page catches up.
        self.render();
    }

    fn on_client_detached(&self) {
        tracing::info!("client went away, counter kept warm");
    }
}

struct CounterFactory;

#[async_trait]
impl CircuitFactory for CounterFactory {
    type Circuit = CounterCircuit;

    async fn create(&self, circuit_id: CircuitId, client: ClientProxy) -> Arc<CounterCircuit> {
        tracing::info!(circuit_id = %circuit_id, "new counter circuit");
        Arc::new(CounterCircuit {
            client,
            count: Mutex::new(0),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Detailed faults are fine for a demo; leave them off when the
    // client is untrusted.
    let endpoint = Arc::new(CircuitEndpoint::with_options(
        CounterFactory,
        CircuitOptions {
            detailed_errors: true,
            ..CircuitOptions::default()
        },
    ));

    // Build router
    let app = Router::new()
        .route("/", get(index_handler))
        .merge(circuit_router(endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("Counter demo listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Live Circuits - Counter</title>
    <style>
        body {
            margin: 0;
            padding: 40px;
            background: #1e1e1e;
            color: #d4d4d4;
            font-family: system-ui, sans-serif;
        }
        h1 { color: #fff; margin-bottom: 10px; }
        .status { color: #888; font-size: 14px; margin-bottom: 20px; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
        #count { font-size: 64px; font-weight: bold; margin: 20px 0; }
        button {
            background: #333;
            color: #d4d4d4;
            border: 1px solid #555;
            padding: 8px 16px;
            margin-right: 8px;
            cursor: pointer;
        }
        button:hover { background: #444; }
        .upload-row { margin-top: 30px; }
        #digest { color: #888; font-size: 14px; margin-top: 10px; min-height: 1em; }
        #log { color: #a44; font-size: 13px; margin-top: 20px; }
    </style>
</head>
<body>
    <h1>Live Circuits Counter</h1>
    <div class="status" id="status">Connecting...</div>
    <div id="count">-</div>
    <div>
        <button id="plus-one">+1</button>
        <button id="plus-five">+5</button>
        <button id="crash">Crash circuit</button>
    </div>
    <div class="upload-row">
        <input type="file" id="file" />
        <button id="upload">Upload &amp; hash</button>
        <div id="digest"></div>
    </div>
    <div id="log"></div>

    <script>
        const status = document.getElementById('status');
        const countEl = document.getElementById('count');
        const digestEl = document.getElementById('digest');
        const logEl = document.getElementById('log');
        let ws;
        let rxBuffers = [];

        function log(text) {
            const line = document.createElement('div');
            line.textContent = text;
            logEl.prepend(line);
        }

        // A buffer reference is a single-key object tagged '__byte[]';
        // anything else passes through untouched.
        function resolveArg(arg) {
            if (arg && typeof arg === 'object' && !Array.isArray(arg)) {
                const keys = Object.keys(arg);
                if (keys.length === 1 && keys[0] === '__byte[]') {
                    return rxBuffers[Number(arg['__byte[]'])];
                }
            }
            return arg;
        }

        const handlers = {
            render(count) {
                countEl.textContent = count;
            },
            digest(len, hash, bytes) {
                digestEl.textContent =
                    `${len} bytes, hash ${hash}, echoed ${bytes.byteLength} bytes back`;
            },
        };

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/circuit`);
            ws.binaryType = 'arraybuffer';

            ws.onopen = () => {
                rxBuffers = [];
                const circuitId = localStorage.getItem('circuit-id');
                ws.send(JSON.stringify({ type: 'connect', circuit_id: circuitId }));
            };

            ws.onclose = () => {
                status.textContent = 'Disconnected - reconnecting...';
                status.className = 'status disconnected';
                setTimeout(connect, 2000);
            };

            ws.onerror = (err) => {
                console.error('WebSocket error:', err);
            };

            ws.onmessage = (event) => {
                if (event.data instanceof ArrayBuffer) {
                    const view = new DataView(event.data);
                    const id = Number(view.getBigUint64(0));
                    if (id !== rxBuffers.length) {
                        console.error('Buffer frame out of order:', id);
                        return;
                    }
                    rxBuffers.push(event.data.slice(8));
                    return;
                }
                const msg = JSON.parse(event.data);
                if (msg.type === 'connected') {
                    localStorage.setItem('circuit-id', msg.circuit_id);
                    status.textContent = msg.resumed
                        ? `Connected - resumed circuit ${msg.circuit_id}`
                        : `Connected - circuit ${msg.circuit_id}`;
                    status.className = 'status connected';
                } else if (msg.type === 'invoke') {
                    const handler = handlers[msg.method];
                    if (handler) {
                        handler(...msg.args.map(resolveArg));
                    }
                    rxBuffers = [];
                } else if (msg.type === 'error') {
                    log(`Error: ${msg.message}`);
                    if (msg.message.startsWith('Unknown circuit')) {
                        // The server lost it; start a fresh one.
                        localStorage.removeItem('circuit-id');
                        ws.send(JSON.stringify({ type: 'connect', circuit_id: null }));
                    }
                }
            };
        }

        function invoke(method, args) {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify({ type: 'invoke', method, args }));
            }
        }

        document.getElementById('plus-one').onclick = () => invoke('increment', [1]);
        document.getElementById('plus-five').onclick = () => invoke('increment', [5]);
        document.getElementById('crash').onclick = () => invoke('crash', []);

        document.getElementById('upload').onclick = async () => {
            const input = document.getElementById('file');
            const file = input.files && input.files[0];
            if (!file) {
                log('Pick a file first');
                return;
            }
            const bytes = new Uint8Array(await file.arrayBuffer());
            const frame = new Uint8Array(8 + bytes.length);
            new DataView(frame.buffer).setBigUint64(0, 0n);
            frame.set(bytes, 8);
            ws.send(frame);
            invoke('upload', [{ '__byte[]': 0 }]);
        };

        connect();
    </script>
</body>
</html>
"#;
