// XML-RPC wire codec
//
// Encodes method calls from `serde_json::Value` parameters and decodes
// method responses back into `Value`. Typing happens one layer up, in
// `object`.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use serde_json::{Map, Number, Value};

use crate::error::{Error, Fault};

/// What the backend sends in place of "no value".
const NONE_MARKER: &str = "~";

// ── Encoding ─────────────────────────────────────────────────────────

/// Serialize a method call.
///
/// Fails locally if `method` is not ASCII or if any parameter contains a
/// `Null`: the backend does not accept `<nil/>`.
pub fn encode_call(method: &str, params: &[Value]) -> Result<String, Error> {
    if !method.is_ascii() {
        return Err(Error::Encoding {
            method: method.into(),
            reason: "method names must be ASCII".into(),
        });
    }

    let mut out = String::with_capacity(128);
    out.push_str("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(method, param, &mut out)?;
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>\n");
    Ok(out)
}

fn encode_value(method: &str, value: &Value, out: &mut String) -> Result<(), Error> {
    out.push_str("<value>");
    match value {
        Value::Null => {
            return Err(Error::Encoding {
                method: method.into(),
                reason: "the backend does not accept nil values".into(),
            });
        }
        Value::Bool(b) => {
            out.push_str(if *b { "<boolean>1</boolean>" } else { "<boolean>0</boolean>" });
        }
        Value::Number(n) => encode_number(method, n, out)?,
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(method, item, out)?;
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(method, member, out)?;
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
    Ok(())
}

fn encode_number(method: &str, n: &Number, out: &mut String) -> Result<(), Error> {
    if let Some(int) = n.as_i64() {
        let tag = if i32::try_from(int).is_ok() { "int" } else { "i8" };
        out.push_str(&format!("<{tag}>{int}</{tag}>"));
        return Ok(());
    }
    match n.as_f64() {
        Some(float) if n.is_f64() => {
            out.push_str(&format!("<double>{float}</double>"));
            Ok(())
        }
        _ => Err(Error::Encoding {
            method: method.into(),
            reason: format!("integer {n} exceeds XML-RPC limits"),
        }),
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Minimal element tree; XML-RPC documents are small and shallow.
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Result<&Element, Error> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| decoding(format!("<{}> has no <{name}>", self.name)))
    }
}

fn decoding(message: impl Into<String>) -> Error {
    Error::Decoding {
        message: message.into(),
    }
}

fn parse_tree(body: &str) -> Result<Element, Error> {
    let mut reader = Reader::from_str(body);
    let mut stack = vec![Element::default()];

    loop {
        let event = reader
            .read_event()
            .map_err(|e| decoding(format!("at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(start) => stack.push(Element::named(start.local_name().as_ref())),
            Event::Empty(empty) => {
                let element = Element::named(empty.local_name().as_ref());
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(decoding("unbalanced closing tag"));
                }
                if let Some(element) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| decoding(e.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(cdata) => {
                let raw = cdata.into_inner();
                let text = std::str::from_utf8(&raw).map_err(|e| decoding(e.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match stack.pop() {
        Some(root) if stack.is_empty() => Ok(root),
        _ => Err(decoding("document ended inside an element")),
    }
}

/// Parse a method response.
///
/// A `<fault>` response becomes [`Error::Fault`]; the result value is
/// returned as-is (see [`repair_none_markers`] for the backend's quirks).
pub fn decode_response(body: &str) -> Result<Value, Error> {
    let root = parse_tree(body)?;
    let response = root.child("methodResponse")?;

    if let Ok(fault) = response.child("fault") {
        return Err(Error::Fault(decode_fault(fault.child("value")?)?));
    }

    let value = response.child("params")?.child("param")?.child("value")?;
    decode_value(value)
}

fn decode_fault(value: &Element) -> Result<Fault, Error> {
    let Value::Object(mut members) = decode_value(value)? else {
        return Err(decoding("fault value is not a struct"));
    };
    let code = members
        .get("faultCode")
        .and_then(Value::as_i64)
        .ok_or_else(|| decoding("fault has no integer faultCode"))?;
    let message = match members.remove("faultString") {
        Some(Value::String(s)) => s,
        _ => return Err(decoding("fault has no faultString")),
    };
    Ok(Fault::new(code, message))
}

fn decode_value(value: &Element) -> Result<Value, Error> {
    // A <value> without a type element is a string.
    let Some(typed) = value.children.first() else {
        return Ok(Value::String(value.text.clone()));
    };
    let text = typed.text.trim();

    match typed.name.as_str() {
        "int" | "i4" | "i8" => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| decoding(format!("bad integer {text:?}: {e}"))),
        "boolean" => match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(decoding(format!("bad boolean {other:?}"))),
        },
        "double" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| decoding(format!("bad double {text:?}"))),
        "string" => Ok(Value::String(typed.text.clone())),
        "dateTime.iso8601" | "base64" => Ok(Value::String(text.to_owned())),
        "nil" => Ok(Value::Null),
        "array" => typed
            .child("data")?
            .children
            .iter()
            .filter(|c| c.name == "value")
            .map(decode_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        "struct" => {
            let mut members = Map::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.child("name")?.text.clone();
                members.insert(name, decode_value(member.child("value")?)?);
            }
            Ok(Value::Object(members))
        }
        other => Err(decoding(format!("unsupported value type <{other}>"))),
    }
}

/// Undo the backend's encoding of "none" as `"~"`, recursively.
///
/// The backend cannot send nil, so it substitutes a tilde everywhere.
/// A genuine `"~"` string is indistinguishable and becomes `Null` too.
pub fn repair_none_markers(value: Value) -> Value {
    match value {
        Value::String(s) if s == NONE_MARKER => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(repair_none_markers).collect()),
        Value::Object(members) => Value::Object(
            members
                .into_iter()
                .map(|(k, v)| (k, repair_none_markers(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encodes_nested_call() {
        let xml = encode_call(
            "xapi_object_edit",
            &[
                json!("system"),
                json!({"name": "node-1", "netboot_enabled": true, "count": 3}),
                json!(["a & b"]),
            ],
        )
        .unwrap();

        assert!(xml.contains("<methodName>xapi_object_edit</methodName>"));
        assert!(xml.contains("<value><string>system</string></value>"));
        assert!(xml.contains("<member><name>netboot_enabled</name><value><boolean>1</boolean></value></member>"));
        assert!(xml.contains("<member><name>count</name><value><int>3</int></value></member>"));
        assert!(xml.contains("<array><data><value><string>a &amp; b</string></value></data></array>"));
    }

    #[test]
    fn large_integers_use_i8() {
        let xml = encode_call("m", &[json!(1_i64 << 40)]).unwrap();
        assert!(xml.contains("<i8>1099511627776</i8>"));
    }

    #[test]
    fn refuses_nil_anywhere() {
        let err = encode_call("modify", &[json!({"comment": null})]).unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }), "got {err:?}");
    }

    #[test]
    fn refuses_non_ascii_method() {
        let err = encode_call("lögin", &[]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn decodes_struct_and_array() {
        let body = r#"<?xml version='1.0'?>
<methodResponse>
<params>
<param>
<value><struct>
<member><name>name</name><value><string>node-1</string></value></member>
<member><name>interfaces</name><value><struct>
  <member><name>eth0</name><value><struct>
    <member><name>mac_address</name><value>aa:bb:cc:dd:ee:ff</value></member>
  </struct></value></member>
</struct></value></member>
<member><name>tags</name><value><array><data>
  <value><int>7</int></value>
  <value><boolean>0</boolean></value>
  <value><double>1.5</double></value>
</data></array></value></member>
</struct></value>
</param>
</params>
</methodResponse>
"#;
        let value = decode_response(body).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "node-1",
                "interfaces": {"eth0": {"mac_address": "aa:bb:cc:dd:ee:ff"}},
                "tags": [7, false, 1.5],
            })
        );
    }

    #[test]
    fn decodes_fault() {
        let body = r"<?xml version='1.0'?>
<methodResponse><fault><value><struct>
<member><name>faultCode</name><value><int>1</int></value></member>
<member><name>faultString</name><value><string>invalid token: abc &amp; def</string></value></member>
</struct></value></fault></methodResponse>";
        match decode_response(body) {
            Err(Error::Fault(fault)) => {
                assert_eq!(fault.code, 1);
                assert_eq!(fault.message, "invalid token: abc & def");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        let err = decode_response("<html><body>502 Bad Gateway</body></html>").unwrap_err();
        assert!(matches!(err, Error::Decoding { .. }), "got {err:?}");
    }

    #[test]
    fn repairs_none_markers_recursively() {
        let raw = json!({"gateway": "~", "list": ["~", "x"], "nested": {"a": "~"}, "keep": "~~"});
        assert_eq!(
            repair_none_markers(raw),
            json!({"gateway": null, "list": [null, "x"], "nested": {"a": null}, "keep": "~~"})
        );
    }
}
