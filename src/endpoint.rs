//! The `/judge` websocket endpoint (C8, spec.md §4.8): a long-lived,
//! bidirectional channel. Inbound text frames are decoded as
//! [`SubmissionWire`] and handed to the [`Dispatcher`]; finished results are
//! pushed back out as they become available.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web::{Error, HttpRequest, HttpResponse, web};
use actix_web_actors::ws;
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;

use crate::dispatcher::Dispatcher;
use crate::submission::{OutboundResult, Submission, SubmissionWire};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// Delivered from the dispatcher's result broadcast into this actor's own
/// mailbox, so the websocket write always happens on the actor's thread.
#[derive(Message)]
#[rtype(result = "()")]
struct ResultMessage(OutboundResult);

pub struct JudgeSocket {
    dispatcher: Arc<Dispatcher>,
    last_heartbeat: Instant,
}

impl JudgeSocket {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            last_heartbeat: Instant::now(),
        }
    }

    fn forward_results(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let mut rx = self.dispatcher.subscribe();
        let addr = ctx.address();
        actix::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(outbound) => addr.do_send(ResultMessage(outbound)),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |socket, ctx| {
            if Instant::now().duration_since(socket.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("judge client timed out, dropping connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let wire: SubmissionWire = match serde_json::from_str(text) {
            Ok(wire) => wire,
            Err(e) => {
                warn!("malformed submission: {e}");
                ctx.text(format!(r#"{{"error":"malformed submission: {e}"}}"#));
                return;
            }
        };
        let submission: Submission = match wire.try_into() {
            Ok(submission) => submission,
            Err(e) => {
                warn!("rejected submission: {e}");
                ctx.text(format!(r#"{{"error":"{e}"}}"#));
                return;
            }
        };
        self.dispatcher.emit(submission);
    }
}

impl Actor for JudgeSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        self.forward_results(ctx);
    }
}

impl Handler<ResultMessage> for JudgeSocket {
    type Result = ();

    fn handle(&mut self, msg: ResultMessage, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(text) => ctx.text(text),
            Err(e) => warn!("failed to serialize result for chal {}: {e}", msg.0.chal_id),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for JudgeSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("unexpected binary frame on /judge, ignoring");
            }
            _ => {}
        }
    }
}

/// `GET /judge`. `check_origin` is intentionally never enforced: this
/// endpoint is meant to sit behind a trusted frontend, not be exposed
/// directly to browsers (spec.md §4.8).
pub async fn judge_ws(
    req: HttpRequest,
    stream: web::Payload,
    dispatcher: web::Data<Arc<Dispatcher>>,
) -> Result<HttpResponse, Error> {
    info!("judge client connected from {:?}", req.peer_addr());
    ws::start(JudgeSocket::new(dispatcher.get_ref().clone()), &req, stream)
}
