/// Read-through caching against a [`Cache`](crate::db::Cache).
///
/// Returns the cached value when present. Otherwise awaits `$block`, queues
/// the result for a background write with the given TTL (seconds) and
/// returns it. A failed cache read is logged and treated as a miss, so a
/// Redis outage costs latency, not availability. Errors from `$block`
/// propagate with `?`.
///
/// # Example
/// ```rust,ignore
/// let genres = cached!(self.cache, CacheKey::MovieGenres(id), ttl, self.inner.get_genres(id));
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.get_from_cache(&$key).await {
            Ok(Some(hit)) => Ok(hit),
            other => {
                if let Err(e) = other {
                    tracing::warn!(key = %$key, error = %e, "Cache read failed, falling through");
                }
                let value = $block.await?;
                $cache.set_in_background(&$key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
