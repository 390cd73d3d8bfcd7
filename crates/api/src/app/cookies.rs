//! Refresh/access token cookies.
//!
//! Parsing and `Set-Cookie` serialization go through `tower_cookies`; the
//! [`CookieManagerLayer`](tower_cookies::CookieManagerLayer) is installed on the router.

use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite, time::Duration as CookieDuration},
};

pub const REFRESH_COOKIE: &str = "refresh_token";
pub const ACCESS_COOKIE: &str = "access_token";

/// Where the refresh cookie is scoped; it is only ever sent to the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub refresh_path: String,
}

impl CookieSettings {
    pub fn refresh_cookie(&self, token: impl Into<String>, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build((REFRESH_COOKIE, token.into()))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .path(self.refresh_path.clone())
            .max_age(CookieDuration::seconds(max_age_secs.max(0)))
            .build()
    }

    /// Removal cookie; attributes must match the ones the cookie was set with.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((REFRESH_COOKIE, ""))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .path(self.refresh_path.clone())
            .max_age(CookieDuration::ZERO)
            .build()
    }

    pub fn set_refresh(&self, cookies: &Cookies, token: impl Into<String>, max_age_secs: i64) {
        cookies.add(self.refresh_cookie(token, max_age_secs));
    }

    pub fn clear_refresh(&self, cookies: &Cookies) {
        cookies.remove(self.removal_cookie());
    }
}

/// Non-empty value of the named request cookie.
pub fn cookie_value(cookies: &Cookies, name: &str) -> Option<String> {
    cookies
        .get(name)
        .map(|c| c.value().trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CookieSettings {
        CookieSettings {
            refresh_path: "/auth".into(),
        }
    }

    #[test]
    fn refresh_cookie_attributes() {
        let cookie = settings().refresh_cookie("abc", 60);
        assert_eq!(cookie.name(), REFRESH_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/auth"));
        assert_eq!(cookie.max_age(), Some(CookieDuration::seconds(60)));

        let rendered = cookie.to_string();
        for attr in ["HttpOnly", "Secure", "SameSite=Strict", "Path=/auth", "Max-Age=60"] {
            assert!(rendered.contains(attr), "missing {attr} in {rendered}");
        }
    }

    #[test]
    fn negative_lifetime_clamps_to_zero() {
        let cookie = settings().refresh_cookie("abc", -5);
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
    }

    #[test]
    fn removal_cookie_expires_immediately_on_the_same_path() {
        let cookie = settings().removal_cookie();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.path(), Some("/auth"));
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let cookies = Cookies::default();
        cookies.add(Cookie::new("a", "1"));
        cookies.add(Cookie::new(REFRESH_COOKIE, "r.t.k"));
        cookies.add(Cookie::new(ACCESS_COOKIE, "  "));

        assert_eq!(cookie_value(&cookies, REFRESH_COOKIE).as_deref(), Some("r.t.k"));
        assert_eq!(cookie_value(&cookies, ACCESS_COOKIE), None);
        assert_eq!(cookie_value(&cookies, "missing"), None);
    }
}
