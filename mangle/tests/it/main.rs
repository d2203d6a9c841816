mod control;
mod daemon;
mod forwarding;
