//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Remove a Markdown code-fence wrapper from model output, if present.
/// Models asked for strict JSON still wrap it in ```json fences often
/// enough that every parse site goes through this first.
pub fn strip_code_fences(raw: &str) -> &str {
  raw
    .trim()
    .trim_start_matches("```json")
    .trim_start_matches("```")
    .trim_end_matches("```")
    .trim()
}

/// First `max` characters of `s`, cut on a char boundary.
/// Used to bound the excerpt sent for concept identification.
pub fn truncate_chars(s: &str, max: usize) -> &str {
  match s.char_indices().nth(max) {
    Some((idx, _)) => &s[..idx],
    None => s,
  }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    s.to_string()
  } else {
    let cut = truncate_chars(s, max);
    format!("{}… ({} bytes total)", cut, s.len())
  }
}
