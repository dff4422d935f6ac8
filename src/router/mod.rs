//! # Router Module
//!
//! Topic routing: channel names such as `events/{id}` are compiled into
//! regex matchers at load time, and each published topic is resolved to the
//! first channel (in declaration order) whose matcher accepts it.
//!
//! ## Matching rules
//!
//! - `{name}` captures one or more characters up to the next separator
//!   (default `/`); literal text is matched verbatim.
//! - The segment count must be identical; there are no wildcards.
//! - Matching is case-insensitive and tolerates one trailing separator unless
//!   [`TopicOptions`](crate::config::TopicOptions) say otherwise.
//! - Captured values are percent-decoded.
//!
//! ## Example
//!
//! ```rust
//! use asyncapi_pub::config::TopicOptions;
//! use asyncapi_pub::router::TopicRouter;
//!
//! let router = TopicRouter::from_patterns(
//!     ["events/{id}", "users/{user_id}/signedup"],
//!     &TopicOptions::default(),
//! ).unwrap();
//!
//! let m = router.route("users/ada%20l/signedup").unwrap().unwrap();
//! assert_eq!(m.index, 1);
//! assert_eq!(m.get_param("user_id"), Some("ada l"));
//! ```

mod core;

pub use self::core::{ParamVec, TopicMatch, TopicMatcher, TopicRouter, MAX_INLINE_PARAMS};
