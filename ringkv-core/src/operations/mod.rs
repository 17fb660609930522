pub mod fanout;
pub mod get_value;
pub mod put_value;
pub mod reconcile;

pub use fanout::{Fanout, FanoutMode, PeerReply};
pub use get_value::{
    GetValueOperation, GetValueOperationOutcome, GetValueOperationRequest,
    GetValueOperationResult,
};
pub use put_value::{PutValueOperation, PutValueOperationRequest, PutValueOperationResult};
pub use reconcile::reconcile;
