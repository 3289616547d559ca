use crate::completion::{CompletionBridge, CompletionCallback, CompletionState};
use crate::event::{Event, InvocationContext};
use crate::proxy::{proxy, InnerServer, Resolution};
use crate::transforms::Pipeline;
use tracing::debug;

/// The entry point for the invocation runtime.
///
/// Normalizes the event, runs it through the inner server and reports the outcome
/// through the completion callback.
#[derive(Clone, Debug)]
pub struct LambdaBridge {
    server: InnerServer,
    pipeline: Pipeline,
}

impl LambdaBridge {
    /// A bridge with the standard transform pipeline.
    pub fn new(server: InnerServer) -> Self {
        Self::with_pipeline(server, Pipeline::standard())
    }

    pub fn with_pipeline(server: InnerServer, pipeline: Pipeline) -> Self {
        Self { server, pipeline }
    }

    /// Handles one invocation. The callback is invoked exactly once, before this function returns.
    ///
    /// Returns the terminal state of the invocation.
    pub async fn handle(&self, event: Event, context: InvocationContext, callback: CompletionCallback) -> CompletionState {
        debug!("Invocation started. Event: {:?}, context: {:?}", event, context);

        let completion = CompletionBridge::new(callback);
        let event = self.pipeline.apply(event);
        debug!("Normalized event: {:?}", event);

        // the proxy completes through its own callback path and returns the same outcome,
        // which is routed to the same bridge and dropped there
        let outcome = proxy(
            &self.server,
            event,
            &context,
            Resolution::Callback(completion.clone()),
        )
        .await;
        completion.complete(outcome);

        completion.state()
    }
}
