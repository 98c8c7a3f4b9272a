//! API route identity and rate-limit bucket keys.

use std::borrow::Cow;
use std::fmt;

use corded_model::Snowflake;

/// One endpoint invocation: a path template plus its substituted parameters.
///
/// Two requests share a rate-limit quota iff they share a [`bucket`] key,
/// which is derived from the template and the three rate-limit-significant
/// ids (guild, channel, webhook). Other parameters affect only the resolved
/// path.
///
/// ```
/// use corded_http::Route;
///
/// let route = Route::new("/channels/{channel_id}/messages").channel_id(5u64);
/// assert_eq!(route.resolved_path(), "/channels/5/messages");
/// assert_eq!(route.bucket(), "0-5-0::/channels/{channel_id}/messages");
/// ```
///
/// [`bucket`]: Route::bucket
#[derive(Debug, Clone)]
pub struct Route {
    path: Cow<'static, str>,
    resolved: String,
    guild_id: u64,
    channel_id: u64,
    webhook_id: u64,
}

impl Route {
    /// Create a route from a path template with `{name}` placeholders.
    pub fn new(path: impl Into<Cow<'static, str>>) -> Self {
        let path = path.into();
        let resolved = path.clone().into_owned();

        Self {
            path,
            resolved,
            guild_id: 0,
            channel_id: 0,
            webhook_id: 0,
        }
    }

    /// Substitute `{guild_id}` and record the id for the bucket key.
    pub fn guild_id(mut self, id: impl Into<Snowflake>) -> Self {
        let id = id.into().get();
        self.guild_id = id;
        self.substitute("guild_id", id)
    }

    /// Substitute `{channel_id}` and record the id for the bucket key.
    pub fn channel_id(mut self, id: impl Into<Snowflake>) -> Self {
        let id = id.into().get();
        self.channel_id = id;
        self.substitute("channel_id", id)
    }

    /// Substitute `{webhook_id}` and record the id for the bucket key.
    pub fn webhook_id(mut self, id: impl Into<Snowflake>) -> Self {
        let id = id.into().get();
        self.webhook_id = id;
        self.substitute("webhook_id", id)
    }

    /// Substitute any other `{name}` placeholder.
    ///
    /// Parameters supplied through this method never influence the bucket.
    pub fn param(self, name: &str, value: impl fmt::Display) -> Self {
        self.substitute(name, value)
    }

    fn substitute(mut self, name: &str, value: impl fmt::Display) -> Self {
        let placeholder = format!("{{{name}}}");
        self.resolved = self.resolved.replace(&placeholder, &value.to_string());
        self
    }

    /// The unsubstituted path template.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path with all supplied parameters substituted.
    pub fn resolved_path(&self) -> &str {
        &self.resolved
    }

    /// The rate-limit bucket key for this route.
    pub fn bucket(&self) -> String {
        format!(
            "{}-{}-{}::{}",
            self.guild_id, self.channel_id, self.webhook_id, self.path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_path_and_bucket() {
        let route = Route::new("/channels/{channel_id}/messages").channel_id(5u64);
        assert_eq!(route.resolved_path(), "/channels/5/messages");
        assert_eq!(route.bucket(), "0-5-0::/channels/{channel_id}/messages");
    }

    #[test]
    fn test_bucket_ignores_insignificant_params() {
        let a = Route::new("/channels/{channel_id}/messages/{message_id}")
            .channel_id(5u64)
            .param("message_id", 10);
        let b = Route::new("/channels/{channel_id}/messages/{message_id}")
            .channel_id(5u64)
            .param("message_id", 99);

        assert_ne!(a.resolved_path(), b.resolved_path());
        assert_eq!(a.bucket(), b.bucket());
    }

    #[test]
    fn test_bucket_distinguishes_significant_ids() {
        let a = Route::new("/guilds/{guild_id}/members").guild_id(1u64);
        let b = Route::new("/guilds/{guild_id}/members").guild_id(2u64);
        assert_ne!(a.bucket(), b.bucket());
    }

    #[test]
    fn test_parameterless_route() {
        let route = Route::new("/gateway/bot");
        assert_eq!(route.resolved_path(), "/gateway/bot");
        assert_eq!(route.bucket(), "0-0-0::/gateway/bot");
    }
}
