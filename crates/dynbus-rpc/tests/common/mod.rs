//! Shared fixtures: a small WebGL-like object model, an in-process router and
//! a raw node that speaks envelopes directly.

#![allow(dead_code)]

use std::any::Any;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use dynbus_core::DynbusError;
use dynbus_router::broker::{Broker, RoutingPolicy};
use dynbus_router::obs::metrics::RouterMetrics;
use dynbus_rpc::{
    Class, ClassBuilder, Endpoint, EndpointConfig, Local, RemoteObject, Server, ServerProxy,
    Transport,
};

pub const CONSTRUCTORS: [&str; 5] = [
    "RootObjectType",
    "WebGLRenderingContext",
    "WebGLBuffer",
    "Float32Array",
    "Uint16Array",
];

// ---- object model ----

pub struct Document {
    title: Mutex<String>,
    pub gl: Arc<GlContext>,
}

impl Document {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            title: Mutex::new("untitled".into()),
            gl: Arc::new(GlContext {
                base: GlBase::default(),
            }),
        })
    }
}

#[derive(Default)]
pub struct GlBase {
    log: Mutex<Vec<String>>,
}

impl GlBase {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

pub struct GlContext {
    base: GlBase,
}

impl GlContext {
    pub fn log(&self) -> Vec<String> {
        self.base.log.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct GlBuffer;

struct Classes {
    document: Arc<Class>,
    gl_base: Arc<Class>,
    gl: Arc<Class>,
    buffer: Arc<Class>,
}

fn classes() -> &'static Classes {
    static CLASSES: OnceLock<Classes> = OnceLock::new();
    CLASSES.get_or_init(|| {
        let document = ClassBuilder::<Document>::new("RootObjectType")
            .property_rw(
                "title",
                |d| Ok(Local::from(d.title.lock().unwrap().clone())),
                |d, v| {
                    let s = v
                        .as_value()
                        .and_then(Value::as_str)
                        .ok_or_else(|| DynbusError::Method("title must be a string".into()))?;
                    *d.title.lock().unwrap() = s.to_string();
                    Ok(())
                },
            )
            .property("readyState", |_| Ok(Local::from("complete")))
            .method("getContext", |d, p| {
                let kind: String = p.next()?;
                match kind.as_str() {
                    "webgl" => Ok(Local::Object(d.gl.clone())),
                    _ => Ok(Local::null()),
                }
            })
            .method("echo", |_, p| p.next_local())
            .method("describe", |_, p| {
                let v = p.next_local()?;
                Ok(Local::from(match v.as_object() {
                    Some(obj) => obj.class().name().to_string(),
                    None => "data".to_string(),
                }))
            })
            .method("fail", |_, _| {
                Err(DynbusError::Remote {
                    code: "GL_INVALID_ENUM".into(),
                    message: "bad enum".into(),
                })
            })
            .build();

        let gl_base = ClassBuilder::<GlBase>::new("WebGLRenderingContextBase")
            .property("drawingBufferWidth", |_| Ok(Local::from(300)))
            .method("clear", |b, p| {
                let mask: u32 = p.next()?;
                p.finish()?;
                b.record(format!("clear {mask}"));
                Ok(Local::null())
            })
            .method("clearColor", |b, p| {
                let rgba = [p.next::<f64>()?, p.next()?, p.next()?, p.next()?];
                p.finish()?;
                b.record(format!("clearColor {rgba:?}"));
                Ok(Local::null())
            })
            .method("getError", |_, _| Ok(Local::from(0)))
            .build();

        let gl = ClassBuilder::<GlContext>::new("WebGLRenderingContext")
            .extends(&gl_base)
            .method("createBuffer", |_, _| Ok(Local::object(Arc::new(GlBuffer))))
            .method("bindBuffer", |g, p| {
                let target: u32 = p.next()?;
                let buffer = p.next_optional_object()?;
                p.finish()?;
                g.base.record(format!(
                    "bindBuffer {target} {}",
                    buffer.map(|b| b.class().name().to_string()).unwrap_or_else(|| "null".into())
                ));
                Ok(Local::null())
            })
            .method("bufferData", |g, p| {
                let target: u32 = p.next()?;
                let data = p.next_typed_array()?;
                let usage: u32 = p.next()?;
                p.finish()?;
                g.base.record(format!(
                    "bufferData {target} {} {} {usage}",
                    data.kind.as_str(),
                    data.values.len()
                ));
                Ok(Local::null())
            })
            .method("isBuffer", |_, p| {
                let obj = p.next_object()?;
                Ok(Local::from(obj.as_any().is::<GlBuffer>()))
            })
            .build();

        let buffer = ClassBuilder::<GlBuffer>::new("WebGLBuffer").build();

        Classes {
            document,
            gl_base,
            gl,
            buffer,
        }
    })
}

impl RemoteObject for Document {
    fn class(&self) -> Arc<Class> {
        classes().document.clone()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RemoteObject for GlBase {
    fn class(&self) -> Arc<Class> {
        classes().gl_base.clone()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl RemoteObject for GlContext {
    fn class(&self) -> Arc<Class> {
        classes().gl.clone()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn base(&self) -> Option<&dyn RemoteObject> {
        Some(&self.base)
    }
}

impl RemoteObject for GlBuffer {
    fn class(&self) -> Arc<Class> {
        classes().buffer.clone()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---- harness ----

pub fn broker() -> Arc<Broker> {
    Arc::new(Broker::new(
        RoutingPolicy::default(),
        Arc::new(RouterMetrics::default()),
    ))
}

pub fn endpoint(b: &Arc<Broker>, server: Option<Server>) -> Endpoint {
    let (tx, rx) = b.attach(256);
    Endpoint::start(
        Transport::from_channels(tx, rx),
        server,
        &EndpointConfig::default(),
    )
}

pub struct Session {
    pub broker: Arc<Broker>,
    pub document: Arc<Document>,
    pub browser: Endpoint,
    pub controller: Endpoint,
    pub proxy: ServerProxy,
}

/// "browser" serves a `Document`; the controller is connected to it.
pub async fn session() -> Session {
    let broker = broker();
    let document = Document::new();
    let browser = endpoint(&broker, Some(Server::new(document.clone())));
    browser.listen("browser").await.unwrap();

    let controller = endpoint(&broker, None);
    let proxy = controller.connect_to("browser").await.unwrap();
    for name in CONSTRUCTORS {
        proxy.register_constructor(name);
    }
    Session {
        broker,
        document,
        browser,
        controller,
        proxy,
    }
}

/// A node driven by hand, for asserting on wire frames.
pub struct RawNode {
    pub tx: mpsc::Sender<String>,
    pub rx: mpsc::Receiver<String>,
}

impl RawNode {
    pub fn attach(b: &Arc<Broker>) -> Self {
        let (tx, rx) = b.attach(256);
        Self { tx, rx }
    }

    pub async fn send(&self, frame: Value) {
        self.tx.send(frame.to_string()).await.unwrap();
    }

    pub async fn recv(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("session closed");
        serde_json::from_str(&frame).unwrap()
    }

    pub async fn listen(&mut self, name: &str) {
        self.send(json!({"to": null, "body": {"jsonrpc": "2.0", "method": "__listen__", "params": [name], "id": 0}}))
            .await;
        let ack = self.recv().await;
        assert_eq!(ack["body"]["result"], name);
    }

    /// Reply to the call `call` received from `from`.
    pub async fn reply(&self, to: &str, id: &Value, result: Value) {
        self.send(json!({"to": to, "body": {"jsonrpc": "2.0", "id": id, "result": result}}))
            .await;
    }
}
