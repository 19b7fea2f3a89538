/// Type-state markers for the WebSocket transport builder
///
/// `build()` only exists once a URL has been provided.

/// Marker trait for URL state
pub trait UrlState {}

/// URL has not been set
pub struct NoUrl;
impl UrlState for NoUrl {}

/// URL has been set
pub struct HasUrl;
impl UrlState for HasUrl {}
