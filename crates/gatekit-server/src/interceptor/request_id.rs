//! Request ID interceptor.

use tonic::metadata::MetadataValue;
use tonic::{Request, Status};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assign a fresh `x-request-id` when the caller did not send one.
pub fn request_id_interceptor(mut req: Request<()>) -> Result<Request<()>, Status> {
    if req.metadata().get(REQUEST_ID_HEADER).is_none() {
        let request_id = Uuid::new_v4().to_string();
        let value = MetadataValue::try_from(request_id.as_str())
            .map_err(|_| Status::internal("generated request id is not valid metadata"))?;
        req.metadata_mut().insert(REQUEST_ID_HEADER, value);
    }
    Ok(req)
}
