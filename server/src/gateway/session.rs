// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use actix::{
    clock::Instant, fut::wrap_future, Actor, ActorContext, AsyncContext, Running, StreamHandler,
};
use actix_web_actors::ws;
use tokio::{sync::mpsc, time::Duration};
use tokio_stream::wrappers::UnboundedReceiverStream;

use cachet_backend::{auth_service::AuthenticatedUser, rooms::RoomService};
use cachet_common::{
    events::{client::ClientEvent, server::ServerEvent},
    identifiers::SessionId,
};

use crate::{dispatch::EventDispatcher, registry::SessionRegistry};

use super::handlers;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// The websocket actor for one authenticated session. It registers itself
/// with the registry and the dispatcher, drains its outbound channel onto
/// the socket, and handles each inbound envelope to completion before
/// taking the next.
pub(super) struct ClientSession {
    session_id: SessionId,
    user: AuthenticatedUser,
    heartbeat: Instant,
    room_service: RoomService,
    registry: SessionRegistry,
    dispatch: EventDispatcher,
}

impl ClientSession {
    pub(super) fn new(
        user: AuthenticatedUser,
        room_service: RoomService,
        registry: SessionRegistry,
        dispatch: EventDispatcher,
    ) -> Self {
        ClientSession {
            session_id: SessionId::random(),
            user,
            heartbeat: Instant::now(),
            room_service,
            registry,
            dispatch,
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.heartbeat) > CLIENT_TIMEOUT {
                tracing::info!(
                    session_id = %act.session_id,
                    "Disconnecting websocket because heartbeat failed"
                );
                ctx.stop();
                return;
            }

            ctx.ping(b"Cachet");
        });
    }

    fn handle_frame(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => {
                let task = handlers::handle_client_event(
                    self.room_service.clone(),
                    self.registry.clone(),
                    self.dispatch.clone(),
                    self.session_id,
                    self.user.clone(),
                    event,
                );
                // Handle the event to completion before the next frame.
                ctx.wait(wrap_future(task));
            }
            Err(error) => {
                tracing::warn!(session_id = %self.session_id, %error, "undecodable frame");
                self.send_event(
                    ServerEvent::error(format!("Invalid event: {error}")),
                    ctx,
                );
            }
        }
    }

    fn send_event(&self, event: ServerEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(&event) {
            Ok(text) => ctx.text(text),
            Err(error) => {
                tracing::error!(session_id = %self.session_id, %error, "failed to encode event")
            }
        }
    }
}

impl Actor for ClientSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);

        // Register with dispatch and registry, then drain the outbound
        // channel onto the socket.
        let (tx, rx) = mpsc::unbounded_channel();
        self.dispatch.connect(self.session_id, tx);
        self.registry
            .attach(self.session_id, self.user.user_id, self.user.username.clone());
        ctx.add_stream(UnboundedReceiverStream::new(rx));

        tracing::info!(
            session_id = %self.session_id,
            user_id = %self.user.user_id,
            "session connected"
        );

        // Replay rooms and wrapped keys before any inbound event is taken.
        let announce = handlers::announce_connected(
            self.room_service.clone(),
            self.dispatch.clone(),
            self.session_id,
            self.user.clone(),
        );
        ctx.wait(wrap_future(announce));
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.dispatch.disconnect(self.session_id);
        self.registry.detach(self.session_id);
        tracing::info!(session_id = %self.session_id, "session disconnected");
        Running::Stop
    }
}

/// Outbound events from the dispatcher.
impl StreamHandler<ServerEvent> for ClientSession {
    fn handle(&mut self, event: ServerEvent, ctx: &mut Self::Context) {
        self.send_event(event, ctx);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // The dispatcher dropped our channel; the session is dead.
        ctx.stop();
    }
}

/// Inbound websocket frames.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ClientSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match msg {
            Ok(msg) => msg,
            Err(error) => {
                tracing::warn!(session_id = %self.session_id, %error, "websocket protocol error");
                ctx.stop();
                return;
            }
        };
        match msg {
            ws::Message::Text(text) => self.handle_frame(&text, ctx),
            ws::Message::Ping(bytes) => {
                self.heartbeat = Instant::now();
                ctx.pong(&bytes);
            }
            ws::Message::Pong(_) => {
                self.heartbeat = Instant::now();
            }
            ws::Message::Binary(_) => {
                tracing::warn!(session_id = %self.session_id, "unexpected binary frame");
            }
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) => {
                ctx.stop();
            }
            ws::Message::Nop => {}
        }
    }
}
