//! Parsing of SEFAZ replies.
//!
//! Replies are read into a small element tree keyed by local name, so SOAP
//! prefixes and namespace declarations do not matter. Fragments that are
//! later embedded in distribution XML (`protNFe`, `retEvento`, `retInutNFe`)
//! are kept verbatim from the source.

use chrono::{DateTime, FixedOffset};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use domain::{is_event_accepted, EVENT_CANCELLATION};

use super::{XmlError, XmlResult};

/// Element of a parsed reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub name: String,
    pub text: String,
    pub children: Vec<Node>,
    attributes: Vec<(String, String)>,
    span: (usize, usize),
}

impl Node {
    fn open(start: &BytesStart<'_>, from: usize) -> XmlResult<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::Parse(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            span: (from, from),
            ..Default::default()
        })
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search including `self`.
    pub fn find(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Text of a direct child; `None` when absent or empty.
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Source text of the element.
    pub fn raw<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.span.0..self.span.1).unwrap_or("")
    }
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

/// Parse a complete document into its root element.
pub fn parse(source: &str) -> XmlResult<Node> {
    let mut reader = Reader::from_str(source);
    let mut stack: Vec<Node> = Vec::new();
    let mut root = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Parse(e.to_string()))?;
        let position = reader.buffer_position() as usize;
        match event {
            Event::Start(start) => {
                let from = position.saturating_sub(start.len() + 2);
                stack.push(Node::open(&start, from)?);
            }
            Event::Empty(start) => {
                let mut node = Node::open(&start, position)?;
                node.span = (position, position);
                attach(&mut stack, &mut root, node);
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let unescaped = text.unescape().map_err(|e| XmlError::Parse(e.to_string()))?;
                    top.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let mut node = stack
                    .pop()
                    .ok_or_else(|| XmlError::Parse("unbalanced end tag".into()))?;
                node.span.1 = position;
                node.text = node.text.trim().to_string();
                attach(&mut stack, &mut root, node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Parse("unexpected end of document".into()));
    }
    root.ok_or_else(|| XmlError::Parse("empty document".into()))
}

fn locate<'n>(root: &'n Node, name: &str) -> XmlResult<&'n Node> {
    root.find(name).ok_or_else(|| XmlError::Missing(name.to_string()))
}

fn status_code(node: &Node) -> XmlResult<u16> {
    let text = node
        .text_of("cStat")
        .ok_or_else(|| XmlError::Missing(format!("{}/cStat", node.name)))?;
    text.parse()
        .map_err(|_| XmlError::Invalid("cStat".to_string(), text.to_string()))
}

fn status_message(node: &Node) -> String {
    node.text_of("xMotivo").unwrap_or_default().to_string()
}

fn owned(node: &Node, name: &str) -> Option<String> {
    node.text_of(name).map(str::to_string)
}

fn timestamp(node: &Node, name: &str) -> Option<DateTime<FixedOffset>> {
    node.text_of(name)
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
}

/// `protNFe`: outcome of one NF-e.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolInfo {
    pub access_key: Option<String>,
    pub status_code: u16,
    pub status_message: String,
    pub protocol: Option<String>,
    pub received_at: Option<DateTime<FixedOffset>>,
    pub digest_value: Option<String>,
    /// `protNFe` element as received
    pub raw: String,
}

impl ProtocolInfo {
    fn from_node(prot: &Node, source: &str) -> XmlResult<Self> {
        let inf = prot
            .child("infProt")
            .ok_or_else(|| XmlError::Missing("infProt".into()))?;
        Ok(Self {
            access_key: owned(inf, "chNFe"),
            status_code: status_code(inf)?,
            status_message: status_message(inf),
            protocol: owned(inf, "nProt"),
            received_at: timestamp(inf, "dhRecbto"),
            digest_value: owned(inf, "digVal"),
            raw: prot.raw(source).to_string(),
        })
    }
}

/// `retEnviNFe`
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationReply {
    pub status_code: u16,
    pub status_message: String,
    pub received_at: Option<DateTime<FixedOffset>>,
    /// Set when the batch went to asynchronous processing (103)
    pub receipt: Option<String>,
    pub protocol: Option<ProtocolInfo>,
}

impl AuthorizationReply {
    pub fn from_xml(source: &str) -> XmlResult<Self> {
        let root = parse(source)?;
        let ret = locate(&root, "retEnviNFe")?;
        Ok(Self {
            status_code: status_code(ret)?,
            status_message: status_message(ret),
            received_at: timestamp(ret, "dhRecbto"),
            receipt: ret.child("infRec").and_then(|r| owned(r, "nRec")),
            protocol: ret
                .child("protNFe")
                .map(|p| ProtocolInfo::from_node(p, source))
                .transpose()?,
        })
    }
}

/// `retConsReciNFe`
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptReply {
    pub status_code: u16,
    pub status_message: String,
    pub receipt: Option<String>,
    pub protocols: Vec<ProtocolInfo>,
}

impl ReceiptReply {
    pub fn from_xml(source: &str) -> XmlResult<Self> {
        let root = parse(source)?;
        let ret = locate(&root, "retConsReciNFe")?;
        Ok(Self {
            status_code: status_code(ret)?,
            status_message: status_message(ret),
            receipt: owned(ret, "nRec"),
            protocols: ret
                .children("protNFe")
                .map(|p| ProtocolInfo::from_node(p, source))
                .collect::<XmlResult<_>>()?,
        })
    }

    pub fn protocol_for(&self, access_key: &str) -> Option<&ProtocolInfo> {
        self.protocols
            .iter()
            .find(|p| p.access_key.as_deref() == Some(access_key))
    }
}

/// `retEvento`: outcome of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInfo {
    pub status_code: u16,
    pub status_message: String,
    pub access_key: Option<String>,
    pub event_type: Option<String>,
    pub sequence: Option<u32>,
    pub protocol: Option<String>,
    pub registered_at: Option<DateTime<FixedOffset>>,
    /// `retEvento` element as received
    pub raw: String,
}

impl EventInfo {
    fn from_node(ret: &Node, source: &str) -> XmlResult<Self> {
        let inf = ret
            .child("infEvento")
            .ok_or_else(|| XmlError::Missing("retEvento/infEvento".into()))?;
        Ok(Self {
            status_code: status_code(inf)?,
            status_message: status_message(inf),
            access_key: owned(inf, "chNFe"),
            event_type: owned(inf, "tpEvento"),
            sequence: inf.text_of("nSeqEvento").and_then(|s| s.parse().ok()),
            protocol: owned(inf, "nProt"),
            registered_at: timestamp(inf, "dhRegEvento"),
            raw: ret.raw(source).to_string(),
        })
    }

    pub fn is_accepted(&self) -> bool {
        is_event_accepted(self.status_code)
    }
}

/// `retConsSitNFe`
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolReply {
    pub status_code: u16,
    pub status_message: String,
    pub access_key: Option<String>,
    pub protocol: Option<ProtocolInfo>,
    pub events: Vec<EventInfo>,
}

impl ProtocolReply {
    pub fn from_xml(source: &str) -> XmlResult<Self> {
        let root = parse(source)?;
        let ret = locate(&root, "retConsSitNFe")?;
        let mut events = Vec::new();
        for proc in ret.children("procEventoNFe") {
            if let Some(ret_evento) = proc.child("retEvento") {
                events.push(EventInfo::from_node(ret_evento, source)?);
            }
        }
        Ok(Self {
            status_code: status_code(ret)?,
            status_message: status_message(ret),
            access_key: owned(ret, "chNFe"),
            protocol: ret
                .child("protNFe")
                .map(|p| ProtocolInfo::from_node(p, source))
                .transpose()?,
            events,
        })
    }

    /// Registered cancellation event, if any.
    pub fn cancellation(&self) -> Option<&EventInfo> {
        self.events
            .iter()
            .find(|e| e.event_type.as_deref() == Some(EVENT_CANCELLATION) && e.is_accepted())
    }
}

/// `retConsStatServ`
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReply {
    pub status_code: u16,
    pub status_message: String,
    pub uf_code: Option<u8>,
    pub received_at: Option<DateTime<FixedOffset>>,
    pub average_seconds: Option<u32>,
    pub observation: Option<String>,
}

impl StatusReply {
    pub fn from_xml(source: &str) -> XmlResult<Self> {
        let root = parse(source)?;
        let ret = locate(&root, "retConsStatServ")?;
        Ok(Self {
            status_code: status_code(ret)?,
            status_message: status_message(ret),
            uf_code: ret.text_of("cUF").and_then(|s| s.parse().ok()),
            received_at: timestamp(ret, "dhRecbto"),
            average_seconds: ret.text_of("tMed").and_then(|s| s.parse().ok()),
            observation: owned(ret, "xObs"),
        })
    }
}

/// `retEnvEvento`
#[derive(Debug, Clone, PartialEq)]
pub struct EventReply {
    pub status_code: u16,
    pub status_message: String,
    pub events: Vec<EventInfo>,
}

impl EventReply {
    pub fn from_xml(source: &str) -> XmlResult<Self> {
        let root = parse(source)?;
        let ret = locate(&root, "retEnvEvento")?;
        Ok(Self {
            status_code: status_code(ret)?,
            status_message: status_message(ret),
            events: ret
                .children("retEvento")
                .map(|e| EventInfo::from_node(e, source))
                .collect::<XmlResult<_>>()?,
        })
    }
}

/// `retInutNFe`
#[derive(Debug, Clone, PartialEq)]
pub struct InutilizationReply {
    pub status_code: u16,
    pub status_message: String,
    pub protocol: Option<String>,
    pub received_at: Option<DateTime<FixedOffset>>,
    /// `retInutNFe` element as received
    pub raw: String,
}

impl InutilizationReply {
    pub fn from_xml(source: &str) -> XmlResult<Self> {
        let root = parse(source)?;
        let ret = locate(&root, "retInutNFe")?;
        let inf = ret
            .child("infInut")
            .ok_or_else(|| XmlError::Missing("retInutNFe/infInut".into()))?;
        Ok(Self {
            status_code: status_code(inf)?,
            status_message: status_message(inf),
            protocol: owned(inf, "nProt"),
            received_at: timestamp(inf, "dhRecbto"),
            raw: ret.raw(source).to_string(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    const KEY: &str = "35241111222333000181650020000000421123456780";

    #[test]
    fn test_tree_and_raw_span() {
        let source = r#"<a x="1"><b>  hi &amp; bye </b><c/><b>2</b></a>"#;
        let root = parse(source).unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.text_of("b"), Some("hi & bye"));
        assert_eq!(root.children("b").count(), 2);
        assert!(root.child("c").is_some());
        assert_eq!(root.raw(source), source);
        assert_eq!(root.child("b").unwrap().raw(source), "<b>  hi &amp; bye </b>");
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(parse("<a><b></a>"), Err(XmlError::Parse(_))));
        assert!(matches!(parse(""), Err(XmlError::Parse(_))));
    }

    #[test]
    fn test_authorization_with_protocol() {
        let prot = prot_nfe(KEY, 100, Some("135240000000001"));
        let reply = AuthorizationReply::from_xml(&ret_envi_nfe(104, None, Some(prot.clone()))).unwrap();

        assert_eq!(reply.status_code, 104);
        assert!(reply.receipt.is_none());
        let protocol = reply.protocol.unwrap();
        assert_eq!(protocol.status_code, 100);
        assert_eq!(protocol.access_key.as_deref(), Some(KEY));
        assert_eq!(protocol.protocol.as_deref(), Some("135240000000001"));
        assert_eq!(protocol.raw, prot);
        assert_eq!(
            protocol.received_at.unwrap().to_rfc3339(),
            "2024-11-05T10:30:05-03:00"
        );
    }

    #[test]
    fn test_authorization_async_receipt() {
        let reply = AuthorizationReply::from_xml(&ret_envi_nfe(103, Some("351000012345678"), None)).unwrap();
        assert_eq!(reply.status_code, 103);
        assert_eq!(reply.receipt.as_deref(), Some("351000012345678"));
        assert!(reply.protocol.is_none());
    }

    #[test]
    fn test_missing_reply_element() {
        let err = AuthorizationReply::from_xml(&ret_cons_stat(107)).unwrap_err();
        assert_eq!(err, XmlError::Missing("retEnviNFe".into()));
    }

    #[test]
    fn test_receipt_reply() {
        let reply = ReceiptReply::from_xml(&ret_cons_reci(
            104,
            "351000012345678",
            Some(prot_nfe(KEY, 100, Some("135240000000001"))),
        ))
        .unwrap();
        assert_eq!(reply.receipt.as_deref(), Some("351000012345678"));
        assert!(reply.protocol_for(KEY).is_some());
        assert!(reply.protocol_for("other").is_none());
    }

    #[test]
    fn test_protocol_reply_with_cancellation() {
        let cancel = ret_evento(KEY, "110111", 1, 135, Some("135240000000002"));
        let reply = ProtocolReply::from_xml(&ret_cons_sit(
            101,
            KEY,
            Some(prot_nfe(KEY, 100, Some("135240000000001"))),
            &[cancel.clone()],
        ))
        .unwrap();

        assert_eq!(reply.status_code, 101);
        assert_eq!(reply.access_key.as_deref(), Some(KEY));
        let event = reply.cancellation().unwrap();
        assert_eq!(event.protocol.as_deref(), Some("135240000000002"));
        assert_eq!(event.raw, cancel);
    }

    #[test]
    fn test_status_reply() {
        let reply = StatusReply::from_xml(&ret_cons_stat(107)).unwrap();
        assert_eq!(reply.status_code, 107);
        assert_eq!(reply.status_message, "Servico em Operacao");
        assert_eq!(reply.uf_code, Some(35));
        assert_eq!(reply.average_seconds, Some(1));
    }

    #[test]
    fn test_event_reply() {
        let reply = EventReply::from_xml(&ret_env_evento(
            128,
            &[ret_evento(KEY, "110110", 2, 135, Some("135240000000003"))],
        ))
        .unwrap();
        assert_eq!(reply.status_code, 128);
        let event = &reply.events[0];
        assert!(event.is_accepted());
        assert_eq!(event.sequence, Some(2));
        assert_eq!(event.event_type.as_deref(), Some("110110"));
    }

    #[test]
    fn test_inutilization_reply() {
        let source = ret_inut(102, Some("135240000000009"));
        let reply = InutilizationReply::from_xml(&source).unwrap();
        assert_eq!(reply.status_code, 102);
        assert_eq!(reply.protocol.as_deref(), Some("135240000000009"));
        assert!(reply.raw.starts_with("<retInutNFe "));
        assert!(reply.raw.ends_with("</retInutNFe>"));
    }

    #[test]
    fn test_bad_status_code() {
        let source = soap("<retConsStatServ><cStat>abc</cStat></retConsStatServ>");
        assert_eq!(
            StatusReply::from_xml(&source).unwrap_err(),
            XmlError::Invalid("cStat".into(), "abc".into())
        );
    }
}
