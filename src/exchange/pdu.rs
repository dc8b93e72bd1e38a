//! CoAP message codec (RFC 7252).
//!
//! # Wire Format
//!
//! ```text
//! [ver:2|type:2|tkl:4][code:8][message id:16][token:0-8 bytes]
//! [options, delta-encoded, ascending number][0xFF][payload]
//! ```
//!
//! Option header nibbles 13 and 14 announce one or two extension bytes;
//! 15 is reserved except in the payload marker.

use std::fmt;

/// Protocol version carried in every header.
pub const COAP_VERSION: u8 = 1;

/// Maximum token length.
pub const MAX_TOKEN_LEN: usize = 8;

/// Payload marker byte.
const PAYLOAD_MARKER: u8 = 0xFF;

/// Fixed header size.
const HEADER_SIZE: usize = 4;

/// Option numbers used by the client.
pub mod option {
    /// Uri-Host.
    pub const URI_HOST: u16 = 3;
    /// Uri-Port.
    pub const URI_PORT: u16 = 7;
    /// Uri-Path.
    pub const URI_PATH: u16 = 11;
    /// Content-Format.
    pub const CONTENT_FORMAT: u16 = 12;
    /// Uri-Query.
    pub const URI_QUERY: u16 = 15;
    /// Block2 (block-wise response body).
    pub const BLOCK2: u16 = 23;
}

/// Message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Needs an acknowledgement; retransmitted until acknowledged.
    Confirmable,
    /// Fire-and-forget.
    NonConfirmable,
    /// Acknowledges a confirmable message, possibly carrying a response.
    Acknowledgement,
    /// Rejects a message the receiver could not process.
    Reset,
}

impl MessageType {
    fn bits(self) -> u8 {
        match self {
            Self::Confirmable => 0,
            Self::NonConfirmable => 1,
            Self::Acknowledgement => 2,
            Self::Reset => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }
}

/// Request method or response code, `class.detail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code(pub u8);

impl Code {
    /// 0.00, empty message.
    pub const EMPTY: Code = Code(0x00);
    /// 0.01 GET.
    pub const GET: Code = Code(0x01);
    /// 0.02 POST.
    pub const POST: Code = Code(0x02);
    /// 0.03 PUT.
    pub const PUT: Code = Code(0x03);
    /// 0.04 DELETE.
    pub const DELETE: Code = Code(0x04);
    /// 2.05 Content.
    pub const CONTENT: Code = Code(0x45);
    /// 4.04 Not Found.
    pub const NOT_FOUND: Code = Code(0x84);

    /// Build a code from class and detail.
    pub const fn new(class: u8, detail: u8) -> Self {
        Self((class << 5) | (detail & 0x1F))
    }

    /// Code class (0 request, 2 success, 4 client error, 5 server error).
    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    /// Code detail.
    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    /// Whether this is a request method.
    pub fn is_request(self) -> bool {
        self.class() == 0 && self != Self::EMPTY
    }

    /// Whether this is a response code.
    pub fn is_response(self) -> bool {
        (2..=5).contains(&self.class())
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

/// One option instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    /// Option number.
    pub number: u16,
    /// Raw value.
    pub value: Vec<u8>,
}

impl CoapOption {
    /// Create an option.
    pub fn new(number: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            value: value.into(),
        }
    }

    /// Create an option holding an unsigned integer in minimal big-endian form.
    pub fn uint(number: u16, value: u32) -> Self {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        Self::new(number, bytes[skip..].to_vec())
    }
}

/// Block option value: `[num:4..20][more:1][szx:3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOption {
    /// Block number.
    pub num: u32,
    /// More blocks follow.
    pub more: bool,
    /// Size exponent; the block holds `2^(szx + 4)` bytes.
    pub szx: u8,
}

impl BlockOption {
    /// Largest size exponent; 7 is reserved.
    pub const MAX_SZX: u8 = 6;

    /// Largest block number a three-byte value can carry.
    const MAX_NUM: u32 = (1 << 20) - 1;

    /// Parse an option value of up to three bytes.
    pub fn from_value(value: &[u8]) -> Result<Self, PduError> {
        if value.len() > 3 {
            return Err(PduError::BadBlock);
        }
        let raw = value.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
        let szx = (raw & 0x07) as u8;
        if szx > Self::MAX_SZX {
            return Err(PduError::BadBlock);
        }
        Ok(Self {
            num: raw >> 4,
            more: raw & 0x08 != 0,
            szx,
        })
    }

    /// Bytes per block.
    pub fn size(&self) -> usize {
        1 << (usize::from(self.szx) + 4)
    }

    /// Body offset of this block.
    pub fn offset(&self) -> usize {
        self.num as usize * self.size()
    }

    /// The block that follows this one, at the same size.
    pub fn next(&self) -> Result<Self, PduError> {
        if self.num >= Self::MAX_NUM {
            return Err(PduError::BadBlock);
        }
        Ok(Self {
            num: self.num + 1,
            more: false,
            szx: self.szx,
        })
    }

    /// Encode as option `number`.
    pub fn to_option(&self, number: u16) -> CoapOption {
        let raw = (self.num << 4) | (u32::from(self.more) << 3) | u32::from(self.szx);
        CoapOption::uint(number, raw)
    }
}

/// Options waiting to be attached to a request, kept in ascending number
/// order. Repeated options keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionList(Vec<CoapOption>);

impl OptionList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an option after any existing options with a lower or equal number.
    pub fn insert(&mut self, option: CoapOption) {
        let at = self.0.partition_point(|o| o.number <= option.number);
        self.0.insert(at, option);
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &CoapOption> {
        self.0.iter()
    }
}

/// A CoAP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message type.
    pub mtype: MessageType,
    /// Method or response code.
    pub code: Code,
    /// Message ID for deduplication and ACK matching.
    pub message_id: u16,
    /// Token for request/response matching.
    pub token: Vec<u8>,
    /// Options in ascending number order.
    pub options: Vec<CoapOption>,
    /// Payload (may be empty).
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a message without options or payload.
    pub fn new(mtype: MessageType, code: Code, message_id: u16, token: Vec<u8>) -> Self {
        Self {
            mtype,
            code,
            message_id,
            token,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// An empty ACK for `message_id`.
    pub fn empty_ack(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, Code::EMPTY, message_id, Vec::new())
    }

    /// An empty RST for `message_id`.
    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, Code::EMPTY, message_id, Vec::new())
    }

    /// Whether this is an empty message (code 0.00).
    pub fn is_empty(&self) -> bool {
        self.code == Code::EMPTY
    }

    /// Move every option of `list` into the message, then check that the
    /// encoded message still fits in `max_size` bytes.
    pub fn attach_options(&mut self, list: OptionList, max_size: usize) -> Result<(), PduError> {
        for option in list.0 {
            let at = self.options.partition_point(|o| o.number <= option.number);
            self.options.insert(at, option);
        }
        let len = self.encoded_len()?;
        if len > max_size {
            return Err(PduError::TooLarge { len, max: max_size });
        }
        Ok(())
    }

    /// Values of every instance of option `number`.
    pub fn option_values(&self, number: u16) -> impl Iterator<Item = &[u8]> {
        self.options
            .iter()
            .filter(move |o| o.number == number)
            .map(|o| o.value.as_slice())
    }

    /// Replace every instance of `option.number` with `option`.
    pub fn set_option(&mut self, option: CoapOption) {
        self.options.retain(|o| o.number != option.number);
        let at = self.options.partition_point(|o| o.number <= option.number);
        self.options.insert(at, option);
    }

    /// The Block2 option, if present.
    pub fn block2(&self) -> Result<Option<BlockOption>, PduError> {
        self.option_values(option::BLOCK2)
            .next()
            .map(BlockOption::from_value)
            .transpose()
    }

    /// Uri-Path options joined with `/`.
    pub fn uri_path(&self) -> String {
        self.option_values(option::URI_PATH)
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Size of the encoded message.
    pub fn encoded_len(&self) -> Result<usize, PduError> {
        self.encode().map(|bytes| bytes.len())
    }

    /// Encode to wire format.
    pub fn encode(&self) -> Result<Vec<u8>, PduError> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(PduError::BadTokenLength(self.token.len()));
        }

        let mut out = Vec::with_capacity(HEADER_SIZE + self.token.len() + self.payload.len() + 16);
        out.push((COAP_VERSION << 6) | (self.mtype.bits() << 4) | self.token.len() as u8);
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token);

        let mut previous = 0u16;
        for opt in &self.options {
            if opt.number < previous {
                return Err(PduError::OptionOrder(opt.number));
            }
            let (delta_nibble, delta_ext) = extended(u32::from(opt.number - previous))?;
            let (len_nibble, len_ext) = extended(opt.value.len() as u32)?;
            out.push((delta_nibble << 4) | len_nibble);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&len_ext);
            out.extend_from_slice(&opt.value);
            previous = opt.number;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        Ok(out)
    }

    /// Decode from wire format.
    pub fn decode(buf: &[u8]) -> Result<Self, PduError> {
        if buf.len() < HEADER_SIZE {
            return Err(PduError::Truncated);
        }

        let version = buf[0] >> 6;
        if version != COAP_VERSION {
            return Err(PduError::BadVersion(version));
        }
        let mtype = MessageType::from_bits(buf[0] >> 4);
        let tkl = (buf[0] & 0x0F) as usize;
        if tkl > MAX_TOKEN_LEN {
            return Err(PduError::BadTokenLength(tkl));
        }
        let code = Code(buf[1]);
        let message_id = u16::from_be_bytes([buf[2], buf[3]]);

        if code == Code::EMPTY && (tkl != 0 || buf.len() != HEADER_SIZE) {
            return Err(PduError::MalformedEmpty);
        }

        let token = buf
            .get(HEADER_SIZE..HEADER_SIZE + tkl)
            .ok_or(PduError::Truncated)?
            .to_vec();

        let mut msg = Self::new(mtype, code, message_id, token);
        let mut pos = HEADER_SIZE + tkl;
        let mut number = 0u32;

        while pos < buf.len() {
            let byte = buf[pos];
            pos += 1;

            if byte == PAYLOAD_MARKER {
                if pos == buf.len() {
                    return Err(PduError::EmptyPayload);
                }
                msg.payload = buf[pos..].to_vec();
                break;
            }

            let delta = read_extended(byte >> 4, buf, &mut pos)?;
            let length = read_extended(byte & 0x0F, buf, &mut pos)? as usize;

            number += delta;
            let number = u16::try_from(number).map_err(|_| PduError::OptionNumberOverflow)?;
            let value = buf.get(pos..pos + length).ok_or(PduError::Truncated)?;
            pos += length;
            msg.options.push(CoapOption::new(number, value));
        }

        Ok(msg)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v:1 t:{:?} c:{} i:{:04x} {{",
            self.mtype, self.code, self.message_id
        )?;
        for b in &self.token {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "}}")?;
        if !self.options.is_empty() {
            write!(f, " [")?;
            for (i, opt) in self.options.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}:{}", opt.number, String::from_utf8_lossy(&opt.value))?;
            }
            write!(f, "]")?;
        }
        if !self.payload.is_empty() {
            write!(f, " :: {} bytes", self.payload.len())?;
        }
        Ok(())
    }
}

/// Split a delta or length into its header nibble and extension bytes.
fn extended(value: u32) -> Result<(u8, Vec<u8>), PduError> {
    match value {
        0..=12 => Ok((value as u8, Vec::new())),
        13..=268 => Ok((13, vec![(value - 13) as u8])),
        269..=65_804 => Ok((14, ((value - 269) as u16).to_be_bytes().to_vec())),
        _ => Err(PduError::OptionTooLong(value as usize)),
    }
}

fn read_extended(nibble: u8, buf: &[u8], pos: &mut usize) -> Result<u32, PduError> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => {
            let b = *buf.get(*pos).ok_or(PduError::Truncated)?;
            *pos += 1;
            Ok(u32::from(b) + 13)
        }
        14 => {
            let bytes = buf.get(*pos..*pos + 2).ok_or(PduError::Truncated)?;
            *pos += 2;
            Ok(u32::from(u16::from_be_bytes([bytes[0], bytes[1]])) + 269)
        }
        _ => Err(PduError::ReservedNibble),
    }
}

/// Errors from encoding or decoding messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduError {
    /// Datagram ends before the message does.
    Truncated,
    /// Version other than 1.
    BadVersion(u8),
    /// Token longer than 8 bytes.
    BadTokenLength(usize),
    /// Empty message with token, options or payload.
    MalformedEmpty,
    /// Payload marker followed by nothing.
    EmptyPayload,
    /// Option header used the reserved nibble 15.
    ReservedNibble,
    /// Option number beyond 65535.
    OptionNumberOverflow,
    /// Options not in ascending order.
    OptionOrder(u16),
    /// Option value too long to encode.
    OptionTooLong(usize),
    /// Encoded message exceeds the session's maximum PDU size.
    TooLarge { len: usize, max: usize },
    /// Block option value is malformed or out of range.
    BadBlock,
}

impl fmt::Display for PduError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated message"),
            Self::BadVersion(v) => write!(f, "unsupported version {}", v),
            Self::BadTokenLength(len) => write!(f, "token length {} exceeds 8", len),
            Self::MalformedEmpty => write!(f, "empty message with content"),
            Self::EmptyPayload => write!(f, "payload marker without payload"),
            Self::ReservedNibble => write!(f, "reserved option nibble"),
            Self::OptionNumberOverflow => write!(f, "option number overflow"),
            Self::OptionOrder(n) => write!(f, "option {} out of order", n),
            Self::OptionTooLong(len) => write!(f, "option value of {} bytes too long", len),
            Self::TooLarge { len, max } => write!(f, "message of {} bytes exceeds {}", len, max),
            Self::BadBlock => write!(f, "malformed block option"),
        }
    }
}

impl std::error::Error for PduError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello_request() -> Message {
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 0x1234, vec![0xAB]);
        msg.options.push(CoapOption::new(option::URI_PATH, "hello"));
        msg
    }

    // ==================== Code Tests ====================

    #[test]
    fn test_code_display() {
        assert_eq!(Code::GET.to_string(), "0.01");
        assert_eq!(Code::CONTENT.to_string(), "2.05");
        assert_eq!(Code::NOT_FOUND.to_string(), "4.04");
        assert_eq!(Code::new(5, 3), Code(0xA3));
    }

    #[test]
    fn test_code_classes() {
        assert!(Code::GET.is_request());
        assert!(!Code::EMPTY.is_request());
        assert!(Code::CONTENT.is_response());
        assert!(!Code::GET.is_response());
    }

    // ==================== Encode Tests ====================

    #[test]
    fn test_encode_known_request() {
        let bytes = hello_request().encode().unwrap();
        assert_eq!(
            bytes,
            vec![0x41, 0x01, 0x12, 0x34, 0xAB, 0xB5, b'h', b'e', b'l', b'l', b'o']
        );
    }

    #[test]
    fn test_encode_empty_ack() {
        assert_eq!(
            Message::empty_ack(0xBEEF).encode().unwrap(),
            vec![0x60, 0x00, 0xBE, 0xEF]
        );
    }

    #[test]
    fn test_encode_extended_delta() {
        let mut msg = Message::new(MessageType::NonConfirmable, Code::GET, 1, Vec::new());
        msg.options.push(CoapOption::new(60, vec![0x01]));
        let bytes = msg.encode().unwrap();
        // delta 60 -> nibble 13, ext 47; length 1
        assert_eq!(&bytes[4..], &[0xD1, 47, 0x01]);
    }

    #[test]
    fn test_encode_two_byte_length() {
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 1, Vec::new());
        msg.options.push(CoapOption::new(option::URI_QUERY, vec![b'q'; 300]));
        let bytes = msg.encode().unwrap();
        // delta 15 -> nibble 13 ext 2; length 300 -> nibble 14 ext 31
        assert_eq!(&bytes[4..8], &[0xDE, 2, 0x00, 31]);
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_encode_rejects_long_token() {
        let msg = Message::new(MessageType::Confirmable, Code::GET, 1, vec![0; 9]);
        assert_eq!(msg.encode(), Err(PduError::BadTokenLength(9)));
    }

    #[test]
    fn test_uint_option_is_minimal() {
        assert_eq!(CoapOption::uint(7, 0).value, Vec::<u8>::new());
        assert_eq!(CoapOption::uint(7, 5683).value, vec![0x16, 0x33]);
        assert_eq!(CoapOption::uint(7, 1).value, vec![0x01]);
    }

    // ==================== Decode Tests ====================

    #[test]
    fn test_decode_piggybacked_response() {
        let bytes = [
            0x61, 0x45, 0x12, 0x34, 0xAB, 0xC1, 0x00, 0xFF, b'w', b'o', b'r', b'l', b'd',
        ];
        let msg = Message::decode(&bytes).unwrap();
        assert_eq!(msg.mtype, MessageType::Acknowledgement);
        assert_eq!(msg.code, Code::CONTENT);
        assert_eq!(msg.message_id, 0x1234);
        assert_eq!(msg.token, vec![0xAB]);
        assert_eq!(msg.options, vec![CoapOption::new(option::CONTENT_FORMAT, vec![0])]);
        assert_eq!(msg.payload, b"world");
    }

    #[test]
    fn test_decode_request_round_trip() {
        let msg = hello_request();
        assert_eq!(Message::decode(&msg.encode().unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_decode_rejects_short_datagram() {
        assert_eq!(Message::decode(&[0x40, 0x01]), Err(PduError::Truncated));
    }

    #[test]
    fn test_decode_rejects_bad_version() {
        assert_eq!(
            Message::decode(&[0x81, 0x01, 0, 1, 0xAA]),
            Err(PduError::BadVersion(2))
        );
    }

    #[test]
    fn test_decode_rejects_long_token_length() {
        assert_eq!(
            Message::decode(&[0x49, 0x01, 0, 1]),
            Err(PduError::BadTokenLength(9))
        );
    }

    #[test]
    fn test_decode_rejects_empty_with_token() {
        assert_eq!(
            Message::decode(&[0x61, 0x00, 0, 1, 0xAA]),
            Err(PduError::MalformedEmpty)
        );
    }

    #[test]
    fn test_decode_rejects_marker_without_payload() {
        assert_eq!(
            Message::decode(&[0x60, 0x45, 0, 1, 0xFF]),
            Err(PduError::EmptyPayload)
        );
    }

    #[test]
    fn test_decode_rejects_reserved_nibble() {
        assert_eq!(
            Message::decode(&[0x60, 0x45, 0, 1, 0xF1, 0x00]),
            Err(PduError::ReservedNibble)
        );
    }

    #[test]
    fn test_decode_rejects_truncated_option() {
        assert_eq!(
            Message::decode(&[0x60, 0x45, 0, 1, 0xB5, b'h', b'i']),
            Err(PduError::Truncated)
        );
    }

    // ==================== Option List Tests ====================

    #[test]
    fn test_option_list_keeps_order() {
        let mut list = OptionList::new();
        list.insert(CoapOption::new(option::URI_QUERY, "a=1"));
        list.insert(CoapOption::new(option::URI_PATH, "sensors"));
        list.insert(CoapOption::new(option::URI_HOST, "example.com"));
        list.insert(CoapOption::new(option::URI_PATH, "temp"));

        let numbers: Vec<u16> = list.iter().map(|o| o.number).collect();
        assert_eq!(numbers, vec![3, 11, 11, 15]);

        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 7, vec![1, 2]);
        msg.attach_options(list, 1152).unwrap();
        assert_eq!(msg.uri_path(), "sensors/temp");
    }

    #[test]
    fn test_attach_options_respects_max_size() {
        let mut list = OptionList::new();
        list.insert(CoapOption::new(option::URI_PATH, vec![b'x'; 200]));
        let mut msg = Message::new(MessageType::Confirmable, Code::GET, 7, vec![1, 2]);
        assert!(matches!(
            msg.attach_options(list, 64),
            Err(PduError::TooLarge { max: 64, .. })
        ));
    }

    #[test]
    fn test_display_summary() {
        let shown = hello_request().to_string();
        assert!(shown.contains("c:0.01"));
        assert!(shown.contains("11:hello"));
    }

    // ==================== Block Option Tests ====================

    #[test]
    fn test_block_option_encoding() {
        // num 2, more, 512-byte blocks
        let block = BlockOption { num: 2, more: true, szx: 5 };
        let opt = block.to_option(option::BLOCK2);
        assert_eq!(opt.value, vec![0x2D]);
        assert_eq!(BlockOption::from_value(&opt.value).unwrap(), block);
        assert_eq!(block.size(), 512);
        assert_eq!(block.offset(), 1024);

        // block 0 of 16-byte blocks encodes as a zero-length value
        let first = BlockOption { num: 0, more: false, szx: 0 };
        assert!(first.to_option(option::BLOCK2).value.is_empty());
        assert_eq!(BlockOption::from_value(&[]).unwrap(), first);
    }

    #[test]
    fn test_block_option_rejects_reserved_size() {
        assert_eq!(BlockOption::from_value(&[0x07]), Err(PduError::BadBlock));
        assert_eq!(BlockOption::from_value(&[0, 0, 0, 0x10]), Err(PduError::BadBlock));
    }

    #[test]
    fn test_block_option_next() {
        let block = BlockOption { num: 0, more: true, szx: 6 };
        let next = block.next().unwrap();
        assert_eq!(next, BlockOption { num: 1, more: false, szx: 6 });
        assert_eq!(next.offset(), 1024);
    }

    #[test]
    fn test_set_option_replaces_existing() {
        let mut msg = hello_request();
        msg.set_option(BlockOption { num: 1, more: false, szx: 5 }.to_option(option::BLOCK2));
        msg.set_option(BlockOption { num: 2, more: false, szx: 5 }.to_option(option::BLOCK2));
        assert_eq!(msg.option_values(option::BLOCK2).count(), 1);
        assert_eq!(msg.block2().unwrap().map(|b| b.num), Some(2));
        assert_eq!(msg.options[0].number, option::URI_PATH);

        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.block2().unwrap(), msg.block2().unwrap());
    }
}
