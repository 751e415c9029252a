//! Authorization callbacks.

use std::future::Future;
use std::sync::Arc;

use axum::http::header;
use futures_util::future::{self, BoxFuture, FutureExt};

use crate::dispatch::state::{AuthToken, RequestState};

/// Inspects a request before its body is read. `None` denies it.
pub type Authorizer = Arc<dyn Fn(&RequestState) -> BoxFuture<'static, Option<AuthToken>> + Send + Sync>;

/// Wrap a function returning a future as an [`Authorizer`].
pub fn authorizer_fn<F, Fut>(f: F) -> Authorizer
where
    F: Fn(&RequestState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<AuthToken>> + Send + 'static,
{
    Arc::new(move |state| f(state).boxed())
}

/// Identity established by [`bearer_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerPrincipal;

/// Accept requests carrying `Authorization: Bearer <api_key>`.
pub fn bearer_token(api_key: impl Into<String>) -> Authorizer {
    let expected = format!("Bearer {}", api_key.into());
    Arc::new(move |state: &RequestState| {
        let granted = state
            .headers
            .get(header::AUTHORIZATION)
            .map(|value| constant_time_eq(value.as_bytes(), expected.as_bytes()))
            .unwrap_or(false);

        future::ready(granted.then(|| AuthToken::new(BearerPrincipal))).boxed()
    })
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::state::tests::state_for;
    use crate::http::query::ParamTable;
    use crate::protocol::Service;

    #[tokio::test]
    async fn test_bearer_token() {
        let authorize = bearer_token("s3cret");
        let mut state = state_for(Service::Wms, ParamTable::default());
        assert!(authorize(&state).await.is_none());

        state.headers.insert(header::AUTHORIZATION, "Bearer wrong".parse().unwrap());
        assert!(authorize(&state).await.is_none());

        state.headers.insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
        let token = authorize(&state).await.unwrap();
        assert_eq!(token.downcast_ref::<BearerPrincipal>(), Some(&BearerPrincipal));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
