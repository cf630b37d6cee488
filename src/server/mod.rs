pub mod builder;
pub mod dispatcher;
pub mod handler;
pub mod listener;

pub use builder::LoadBalancerBuilder;
pub use dispatcher::{LoadBalancer, LoadBalancerError};
pub use handler::{ConnectionHandler, TcpRelayHandler};
pub use listener::bind_tcp;
