use std::pin::Pin;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use mockgps_common::proto::{
    mock_location_server::MockLocation,
    BroadcastUpdate,
    CommandReply,
    CommandRequest,
    WatchRequest,
};

use crate::module::handler::{CommandHandler, Dispatched};
use crate::module::state::{BroadcastState, BroadcastStore};

/// gRPC front of the command channel
#[derive(Clone)]
pub struct MockLocationService {
    handler: CommandHandler,
    store: BroadcastStore,
}

impl MockLocationService {
    pub fn new(handler: CommandHandler, store: BroadcastStore) -> Self {
        Self { handler, store }
    }
}

fn sender_name(sender: &str) -> &str {
    if sender.is_empty() { "unknown" } else { sender }
}

/// Proto form of a broadcast state; `present` is false before the first set
pub fn broadcast_update(state: Option<&BroadcastState>) -> BroadcastUpdate {
    match state {
        Some(state) => BroadcastUpdate {
            present: true,
            latitude: state.coordinate.latitude,
            longitude: state.coordinate.longitude,
            has_altitude: state.coordinate.altitude.is_some(),
            altitude: state.coordinate.altitude.unwrap_or_default(),
            captured_at: state.captured_at.clone(),
        },
        None => BroadcastUpdate::default(),
    }
}

#[tonic::async_trait]
impl MockLocation for MockLocationService {
    /// Handle one command. Only get carries a result.
    async fn dispatch(
        &self,
        request: Request<CommandRequest>,
    ) -> Result<Response<CommandReply>, Status> {
        let req = request.into_inner();
        let command_id = uuid::Uuid::now_v7().to_string();

        info!(
            "Received command {} from {}: action={}",
            command_id,
            sender_name(&req.sender),
            req.action
        );

        let mut reply = CommandReply {
            has_result: false,
            result_data: String::new(),
            command_id: command_id.clone(),
        };

        match self.handler.dispatch(&command_id, &req.action, req.extras) {
            Ok(Dispatched::Reply(text)) => {
                reply.has_result = true;
                reply.result_data = text;
            }
            Ok(Dispatched::Queued(_completion)) => {
                // Fire-and-forget: the worker logs how the command ended
                debug!("Command {} queued", command_id);
            }
            Ok(Dispatched::Ignored) => {}
            Err(e) => {
                warn!("Command {} dropped: {}", command_id, e);
            }
        }

        Ok(Response::new(reply))
    }

    type WatchBroadcastStream = Pin<Box<dyn Stream<Item = Result<BroadcastUpdate, Status>> + Send>>;

    async fn watch_broadcast(
        &self,
        request: Request<WatchRequest>,
    ) -> Result<Response<Self::WatchBroadcastStream>, Status> {
        let subscriber = request.into_inner().subscriber;
        info!("{} subscribed to broadcast state", sender_name(&subscriber));

        let stream = WatchStream::new(self.store.subscribe())
            .map(|state| Ok(broadcast_update(state.as_ref())));

        Ok(Response::new(Box::pin(stream)))
    }
}
