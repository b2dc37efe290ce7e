//! In-page scripts.
//!
//! Every script is a single JavaScript expression (usually an IIFE) whose
//! value is JSON-serialisable. Arguments are embedded as JSON literals so
//! selectors and text never need manual escaping.

use serde_json::Value;

use crate::types::Point;

/// A named script to evaluate inside a tab.
#[derive(Debug, Clone, PartialEq)]
pub struct PageScript {
    pub name: &'static str,
    pub source: String,
}

impl PageScript {
    fn new(name: &'static str, source: String) -> Self {
        Self { name, source }
    }
}

fn lit(s: &str) -> Value {
    Value::from(s)
}

/// Current URL and whether the document has finished loading, as a
/// [`crate::types::PageLocation`].
pub fn page_location() -> PageScript {
    PageScript::new(
        "page_location",
        "({ href: location.href, ready: document.readyState === 'complete' })".to_string(),
    )
}

/// Number of elements matching `selector`, or -1 when the selector is invalid.
pub fn count_matches(selector: &str) -> PageScript {
    PageScript::new(
        "count_matches",
        format!(
            "(() => {{ try {{ return document.querySelectorAll({sel}).length; }} catch (e) {{ return -1; }} }})()",
            sel = lit(selector)
        ),
    )
}

/// Scrolls the first match into view and returns its centre as a [`Point`], or null.
pub fn element_center(selector: &str) -> PageScript {
    PageScript::new(
        "element_center",
        format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return null;
  el.scrollIntoView({{ block: 'center', inline: 'center' }});
  const r = el.getBoundingClientRect();
  return {{ x: r.left + r.width / 2, y: r.top + r.height / 2 }};
}})()"#,
            sel = lit(selector)
        ),
    )
}

/// Serialized page markup, cut to `max_chars`.
pub fn page_markup(max_chars: usize) -> PageScript {
    PageScript::new(
        "page_markup",
        format!("document.documentElement.outerHTML.slice(0, {max_chars})"),
    )
}

/// Draws (or moves) the synthetic cursor with a ripple at `at`.
pub fn render_cursor(at: Point) -> PageScript {
    PageScript::new(
        "render_cursor",
        format!(
            r#"(() => {{
  const x = {x}, y = {y};
  let cursor = document.getElementById('tabpilot-cursor');
  if (!cursor) {{
    cursor = document.createElement('div');
    cursor.id = 'tabpilot-cursor';
    cursor.style.cssText = 'position:fixed;left:0;top:0;width:20px;height:20px;margin:-10px 0 0 -10px;' +
      'background:rgba(66,153,225,0.6);border-radius:50%;pointer-events:none;z-index:999999;' +
      'transition:transform 0.3s cubic-bezier(0.4,0,0.2,1);' +
      'box-shadow:0 0 0 2px white,0 0 0 4px rgba(66,153,225,0.3);';
    document.body.appendChild(cursor);
  }}
  cursor.style.transform = 'translate(' + x + 'px,' + y + 'px)';
  const ripple = document.createElement('div');
  ripple.style.cssText = 'position:fixed;left:' + (x - 10) + 'px;top:' + (y - 10) + 'px;width:20px;height:20px;' +
    'background:rgba(66,153,225,0.4);border-radius:50%;pointer-events:none;z-index:999998;' +
    'transition:transform 0.6s ease-out,opacity 0.6s ease-out;';
  document.body.appendChild(ripple);
  requestAnimationFrame(() => {{ ripple.style.transform = 'scale(3)'; ripple.style.opacity = '0'; }});
  setTimeout(() => ripple.remove(), 600);
  return true;
}})()"#,
            x = at.x,
            y = at.y
        ),
    )
}

/// Pointer down/up plus a native click on whatever is at `at`. Returns false if nothing is there.
pub fn click_at(at: Point) -> PageScript {
    PageScript::new(
        "click_at",
        format!(
            r#"(() => {{
  const x = {x}, y = {y};
  const el = document.elementFromPoint(x, y);
  if (!(el instanceof HTMLElement)) return false;
  const outline = el.style.outline;
  el.style.outline = '2px solid rgba(66,153,225,0.6)';
  const init = {{ bubbles: true, cancelable: true, clientX: x, clientY: y, view: window }};
  el.dispatchEvent(new MouseEvent('mousedown', init));
  el.dispatchEvent(new MouseEvent('mouseup', init));
  el.click();
  setTimeout(() => {{ el.style.outline = outline; }}, 500);
  return true;
}})()"#,
            x = at.x,
            y = at.y
        ),
    )
}

/// [`crate::types::MediaState`] of the first `<video>`.
pub fn media_state() -> PageScript {
    PageScript::new(
        "media_state",
        "(() => { const v = document.querySelector('video'); \
         return v ? { present: true, paused: v.paused } : { present: false, paused: true }; })()"
            .to_string(),
    )
}

/// Presses the player's play control, falling back to `video.play()`.
pub fn press_play(control_selector: &str) -> PageScript {
    PageScript::new(
        "press_play",
        format!(
            r#"(() => {{
  const v = document.querySelector('video');
  if (!v || !v.paused) return true;
  const control = document.querySelector({sel});
  if (control instanceof HTMLElement) {{
    control.click();
    return true;
  }}
  v.play().catch(() => {{}});
  return false;
}})()"#,
            sel = lit(control_selector)
        ),
    )
}

/// Transient status banner, removed by the page itself after `duration_ms`.
pub fn show_banner(title: &str, status: &str, duration_ms: u64) -> PageScript {
    PageScript::new(
        "show_banner",
        format!(
            r#"(() => {{
  const banner = document.createElement('div');
  banner.style.cssText = 'position:fixed;top:20px;right:20px;background:rgba(0,0,0,0.7);padding:10px;' +
    'border-radius:8px;z-index:9999;color:white;font-family:system-ui;';
  const head = document.createElement('div');
  head.textContent = {title};
  const line = document.createElement('div');
  line.style.color = '#4ADE80';
  line.textContent = {status};
  banner.append(head, line);
  document.body.appendChild(banner);
  setTimeout(() => banner.remove(), {duration_ms});
  return true;
}})()"#,
            title = lit(title),
            status = lit(status),
        ),
    )
}

pub fn click_selector(selector: &str) -> PageScript {
    PageScript::new(
        "click_selector",
        format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!(el instanceof HTMLElement)) return false; el.click(); return true; }})()",
            sel = lit(selector)
        ),
    )
}

/// Sets an input's value and fires `input` and `change`.
pub fn type_into(selector: &str, text: &str) -> PageScript {
    PageScript::new(
        "type_into",
        format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  if (!(el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement)) return false;
  el.focus();
  el.value = {text};
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
            sel = lit(selector),
            text = lit(text)
        ),
    )
}

pub fn scroll_to(position: Point) -> PageScript {
    PageScript::new(
        "scroll_to",
        format!(
            "(() => {{ window.scrollTo({{ top: {y}, left: {x}, behavior: 'smooth' }}); return true; }})()",
            x = position.x,
            y = position.y
        ),
    )
}

pub fn hover(selector: &str) -> PageScript {
    PageScript::new(
        "hover",
        format!(
            "(() => {{ const el = document.querySelector({sel}); if (!(el instanceof HTMLElement)) return false; \
             el.dispatchEvent(new MouseEvent('mouseover', {{ bubbles: true, cancelable: true, view: window }})); \
             return true; }})()",
            sel = lit(selector)
        ),
    )
}
