//! Embedded offline fallback page.

use crate::fetch::ResponseSnapshot;

/// Self-contained page shown when an HTML navigation fails on both the
/// network and the caches. No external references; retries with a reload.
pub const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline - Glimpse Media Viewer</title>
<style>
  body {
    margin: 0;
    min-height: 100vh;
    display: flex;
    align-items: center;
    justify-content: center;
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', system-ui, sans-serif;
    background: #1a1a1a;
    color: #f0f0f0;
    text-align: center;
  }
  main { max-width: 480px; padding: 32px 20px; }
  .icon { font-size: 56px; margin-bottom: 24px; }
  h1 { color: #e5a00d; margin: 0 0 16px; }
  p { font-size: 17px; line-height: 1.6; margin: 0 0 28px; }
  button {
    background: #e5a00d;
    color: #000;
    border: none;
    border-radius: 24px;
    padding: 12px 24px;
    font-size: 16px;
    font-weight: 600;
    cursor: pointer;
  }
  button:hover { background: #f1b020; }
</style>
</head>
<body>
<main>
  <div class="icon">&#x1F4F6;</div>
  <h1>You're offline</h1>
  <p>Glimpse Media Viewer can't reach your media server right now. Check your connection and try again.</p>
  <button type="button" onclick="window.location.reload()">Try again</button>
</main>
</body>
</html>
"#;

/// Builds the offline page response from the embedded template.
#[must_use]
pub fn offline_response() -> ResponseSnapshot {
    ResponseSnapshot::ok("text/html", OFFLINE_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_page_is_self_contained_html() {
        let response = offline_response();
        assert!(response.is_ok());
        assert_eq!(response.content_type(), Some("text/html"));
        assert_eq!(response.body, OFFLINE_HTML.as_bytes());
        assert!(!OFFLINE_HTML.contains("src="));
        assert!(!OFFLINE_HTML.contains("href="));
        assert!(OFFLINE_HTML.contains("window.location.reload()"));
    }
}
