//! Content-delivery configuration: cache policy, origin-request policy and the
//! distribution itself

mod cache;
mod distribution;

pub use cache::{CachePolicy, OriginRequestPolicy, RequestComponent, TtlBounds};
pub use distribution::{
    DistributionConfig, DistributionOrigin, EdgeEventType, EdgeFunction, ErrorResponse,
    ViewerProtocolPolicy,
};
