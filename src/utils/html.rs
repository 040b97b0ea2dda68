/// Sanitizes user-authored text (review and comment bodies, descriptions, bios).
///
/// Whitelist based: harmless inline tags survive, `<script>` and event
/// handler attributes are stripped. The result is an HTML fragment, so text
/// is entity-escaped (`&` is stored as `&amp;`) and clients must render
/// these fields as HTML, not as plain text.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
