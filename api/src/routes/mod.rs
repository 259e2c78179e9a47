pub mod ask;
pub mod documents;
pub mod health_route;
pub mod knowledge;
