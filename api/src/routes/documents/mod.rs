pub mod document_request;
pub mod get_document_route;
pub mod upload_document_route;
