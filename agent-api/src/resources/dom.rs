//! Page-side scripts evaluated through DevTools.
//!
//! Every script is an immediately invoked function receiving the element
//! finder and a JSON argument object, and returns a JSON object with a
//! `found` flag. Input values are never read back from the page.

use serde::Deserialize;
use serde_json::{json, Value};

use super::browser::ElementTarget;

/// Upper bound on page text returned by a single observation or read.
pub const PAGE_TEXT_LIMIT: usize = 4000;
/// Upper bound on interactive elements listed per observation.
pub const ELEMENT_LIMIT: usize = 40;

pub const READY_STATE: &str = "document.readyState";

/// Resolves an element by CSS selector, or by visible text, placeholder,
/// aria-label, name or title. Exact matches win over partial ones.
const FIND_ELEMENT_JS: &str = r#"function (target) {
  if (!target) return null;
  if (target.selector) {
    try { return document.querySelector(target.selector); } catch (e) { return null; }
  }
  const wanted = (target.label || '').trim().toLowerCase();
  if (!wanted) return null;
  const visible = (el) => {
    const rect = el.getBoundingClientRect();
    const style = getComputedStyle(el);
    return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden';
  };
  const names = (el) => [
    el.innerText,
    (el.type === 'submit' || el.type === 'button') ? el.value : '',
    el.getAttribute('placeholder'),
    el.getAttribute('aria-label'),
    el.getAttribute('name'),
    el.getAttribute('title'),
  ];
  const candidates = document.querySelectorAll(
    'a, button, input, textarea, select, label, [role="button"], [role="link"], [role="tab"], [contenteditable="true"]'
  );
  let partial = null;
  for (const el of candidates) {
    if (!visible(el)) continue;
    for (const name of names(el)) {
      const text = (name || '').trim().replace(/\s+/g, ' ').toLowerCase();
      if (!text) continue;
      if (text === wanted) return el;
      if (!partial && text.includes(wanted)) partial = el;
    }
  }
  return partial;
}"#;

const CLICK_BODY: &str = r#"
  const el = find(args.target);
  if (!el) return { found: false };
  el.scrollIntoView({ block: 'center' });
  el.click();
  return { found: true };
"#;

const TYPE_BODY: &str = r#"
  let el = find(args.target);
  if (el && el.tagName === 'LABEL' && el.control) el = el.control;
  if (!el) return { found: false };
  el.scrollIntoView({ block: 'center' });
  el.focus();
  if (el.isContentEditable) {
    el.textContent = args.text;
  } else if (el.tagName === 'SELECT') {
    el.value = args.text;
  } else {
    const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, args.text);
  }
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return { found: true };
"#;

const READ_BODY: &str = r#"
  const el = args.target ? find(args.target) : document.body;
  if (!el) return { found: false };
  return { found: true, text: (el.innerText || el.textContent || '').slice(0, args.max_text) };
"#;

const OBSERVE_BODY: &str = r#"
  const elements = [];
  const nodes = document.querySelectorAll(
    'a, button, input, textarea, select, [role="button"], [role="link"], [role="tab"]'
  );
  for (const el of nodes) {
    if (elements.length >= args.max_elements) break;
    const rect = el.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) continue;
    const tag = el.tagName.toLowerCase();
    const kind = tag === 'input' ? 'input[type=' + (el.type || 'text') + ']' : tag;
    const label = (
      el.innerText ||
      el.getAttribute('aria-label') ||
      el.getAttribute('placeholder') ||
      el.getAttribute('name') ||
      ((el.type === 'submit' || el.type === 'button') ? el.value : '') ||
      ''
    ).trim().replace(/\s+/g, ' ').slice(0, 80);
    elements.push(label ? kind + ' "' + label + '"' : kind);
  }
  const text = document.body ? (document.body.innerText || '') : '';
  return {
    found: true,
    url: location.href,
    title: document.title,
    text: text.slice(0, args.max_text),
    elements,
  };
"#;

/// Result of a script that looks up an element.
#[derive(Debug, Deserialize)]
pub struct ElementOutcome {
    pub found: bool,
    #[serde(default)]
    pub text: String,
}

/// Result of the observation script.
#[derive(Debug, Deserialize)]
pub struct ObservedPage {
    pub url: String,
    pub title: String,
    pub text: String,
    pub elements: Vec<String>,
}

fn script(body: &str, args: &Value) -> String {
    format!("(function (find, args) {{{body}}})({FIND_ELEMENT_JS}, {args})")
}

pub fn click(target: &ElementTarget) -> String {
    script(CLICK_BODY, &json!({ "target": target }))
}

pub fn type_text(target: &ElementTarget, text: &str) -> String {
    script(TYPE_BODY, &json!({ "target": target, "text": text }))
}

pub fn read_text(target: Option<&ElementTarget>) -> String {
    script(
        READ_BODY,
        &json!({ "target": target, "max_text": PAGE_TEXT_LIMIT }),
    )
}

pub fn observe() -> String {
    script(
        OBSERVE_BODY,
        &json!({ "max_text": PAGE_TEXT_LIMIT, "max_elements": ELEMENT_LIMIT }),
    )
}
