mod failures;
mod pipeline;
mod reorg;
mod support;
