pub mod config;
pub mod domain {
    pub mod application;
    pub mod charge;
    pub mod customer;
}
pub mod error;
pub mod states;
pub mod circuit {
    pub mod breaker;
    pub mod state;
}
pub mod retry {
    pub mod executor;
    pub mod policy;
}
pub mod gateways;
pub mod fraud {
    pub mod scorer;
    pub mod types;
}
pub mod webhooks {
    pub mod event;
    pub mod signature;
}
pub mod metrics {
    pub mod collector;
    pub mod event;
    pub mod window;
}
pub mod repo;
pub mod service {
    pub mod payment_service;
}
