mod exactly_once;
mod retry_backpressure;
