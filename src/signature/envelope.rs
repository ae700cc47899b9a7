use super::canonical::{XmlElement, parse};
use super::signer::SigningContext;
use crate::error::{GatewayError, Result, SignatureError};

pub const DOCUMENT: &str = "Document";
pub const DATA: &str = "Data";
pub const HEADER: &str = "Header";
pub const MESSAGE_DETAILS: &str = "MessageDetails";
pub const SIGNATURE: &str = "Signature";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub sender: String,
    pub receiver: String,
    pub fsp_code: String,
    pub msg_id: String,
    /// Raw tag as received; resolved to a `MessageType` by the dispatcher.
    pub message_type: String,
}

impl Header {
    fn from_element(element: &XmlElement) -> Result<Self> {
        let required = |name: &str| {
            element
                .child_text(name)
                .ok_or_else(|| GatewayError::MissingElement(format!("{HEADER}/{name}")))
        };
        Ok(Self {
            sender: element.child_text("Sender").unwrap_or_default(),
            receiver: element.child_text("Receiver").unwrap_or_default(),
            fsp_code: element.child_text("FSPCode").unwrap_or_default(),
            msg_id: required("MsgId")?,
            message_type: required("MessageType")?,
        })
    }

    pub fn to_element(&self) -> XmlElement {
        XmlElement::new(HEADER)
            .with_text("Sender", &self.sender)
            .with_text("Receiver", &self.receiver)
            .with_text("FSPCode", &self.fsp_code)
            .with_text("MsgId", &self.msg_id)
            .with_text("MessageType", &self.message_type)
    }
}

/// A parsed inbound document.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub header: Header,
    pub details: XmlElement,
    pub signature: Option<String>,
    data: XmlElement,
}

impl Envelope {
    pub fn parse(xml: &str) -> Result<Self> {
        let root = parse(xml)?;
        if root.name != DOCUMENT {
            return Err(GatewayError::Malformed(format!(
                "expected <{DOCUMENT}> root, found <{}>",
                root.name
            )));
        }
        let data = root
            .child(DATA)
            .cloned()
            .ok_or_else(|| GatewayError::MissingElement(DATA.into()))?;
        let header = data
            .child(HEADER)
            .ok_or_else(|| GatewayError::MissingElement(HEADER.into()))
            .and_then(Header::from_element)?;
        let details = data
            .child(MESSAGE_DETAILS)
            .cloned()
            .ok_or_else(|| GatewayError::MissingElement(MESSAGE_DETAILS.into()))?;
        let signature = root.child_text(SIGNATURE);

        Ok(Self {
            header,
            details,
            signature,
            data,
        })
    }

    /// The bytes the sender signed.
    pub fn signed_bytes(&self) -> Vec<u8> {
        self.data.canonical_bytes()
    }
}

/// `<Data>` with the header followed by the message details.
pub fn body(header: &Header, details: XmlElement) -> XmlElement {
    XmlElement::new(DATA).with(header.to_element()).with(details)
}

/// Canonicalizes `data`, signs it and emits the compact `<Document>`.
pub fn build_signed_document(data: &XmlElement, signer: &SigningContext) -> std::result::Result<String, SignatureError> {
    let canonical = data.to_canonical();
    let signature = signer.sign(canonical.as_bytes())?;
    Ok(format!(
        "<{DOCUMENT}>{canonical}<{SIGNATURE}>{signature}</{SIGNATURE}></{DOCUMENT}>"
    ))
}

/// Last-resort form used when no signing material is available.
pub fn build_unsigned_document(data: &XmlElement) -> String {
    format!("<{DOCUMENT}>{}</{DOCUMENT}>", data.to_canonical())
}
