pub mod authorization;
pub mod consumer;
pub mod coordinator;
pub mod dispatcher;
pub mod queue;
pub mod reconciler;
pub mod storage;
