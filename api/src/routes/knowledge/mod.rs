pub mod knowledge_route;
