//! Minimal SOAP/XML helpers for ONVIF responses
//!
//! Namespace-agnostic: elements are matched on their local name, whatever
//! prefix the device uses (`tptz:`, `tt:`, `trt:`, none).

/// Byte offsets of every start tag `<[prefix:]local` in `xml`
fn start_tags(xml: &str, local: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = xml[cursor..].find('<') {
        let start = cursor + rel;
        cursor = start + 1;

        let rest = &xml[start + 1..];
        if rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('!') {
            continue;
        }

        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        let local_name = name.rsplit(':').next().unwrap_or(name);

        if local_name == local {
            found.push(start);
        }
    }

    found
}

/// Every `local` element, from its start tag through its closing tag
pub fn elements<'a>(xml: &'a str, local: &str) -> Vec<&'a str> {
    start_tags(xml, local)
        .into_iter()
        .filter_map(|start| {
            let rest = &xml[start..];
            let tag_end = rest.find('>')?;
            if rest[..tag_end].ends_with('/') {
                return Some(&rest[..=tag_end]);
            }

            let mut search = tag_end;
            while let Some(rel) = rest[search..].find("</") {
                let close = search + rel;
                let after = &rest[close + 2..];
                let name_end = after.find('>')?;
                let name = &after[..name_end];
                if name.rsplit(':').next() == Some(local) {
                    return Some(&rest[..close + 2 + name_end + 1]);
                }
                search = close + 2;
            }
            None
        })
        .collect()
}

/// Attribute value on an element's start tag
pub fn attribute(element: &str, attr: &str) -> Option<String> {
    let tag_end = element.find('>')?;
    let tag = &element[..tag_end];

    for quote in ['"', '\''] {
        let pattern = format!(" {}={}", attr, quote);
        if let Some(pos) = tag.find(pattern.as_str()) {
            let value = &tag[pos + pattern.len()..];
            let end = value.find(quote)?;
            return Some(unescape(&value[..end]));
        }
    }
    None
}

/// Inner text of the first `local` element
pub fn text(xml: &str, local: &str) -> Option<String> {
    let element = elements(xml, local).into_iter().next()?;
    let open_end = element.find('>')?;
    let close_start = element.rfind("</")?;
    if close_start <= open_end {
        return None;
    }
    Some(unescape(element[open_end + 1..close_start].trim()))
}

/// Reason text of a SOAP fault, if the body is one
pub fn fault_reason(xml: &str) -> Option<String> {
    let fault = elements(xml, "Fault").into_iter().next()?;
    text(fault, "Text")
        .or_else(|| text(fault, "faultstring"))
        .or_else(|| Some("SOAP fault".to_string()))
}

/// XAddr advertised for a capability section (`Media`, `PTZ`, ...)
pub fn capability_xaddr(xml: &str, capability: &str) -> Option<String> {
    let section = elements(xml, capability).into_iter().next()?;
    text(section, "XAddr")
}

pub fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
