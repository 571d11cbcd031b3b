//! Wire protocol for the execution (TCP) and information (UDP) channels.
//!
//! Every frame starts with a 3-byte header: `u16` frame length (including the
//! header) followed by a `u8` message type. All integers are big-endian;
//! strings are fixed 50-byte fields, zero padded. Client frames are fixed
//! size per type and anything else is a framing error that closes the
//! connection.

use crate::orderbook::TopLevels;
use crate::types::{Instrument, Lifespan, Side, TOP_LEVEL_COUNT};
use thiserror::Error;

/// Header bytes: `u16` length + `u8` message type.
pub const HEADER_SIZE: usize = 3;
/// Fixed width of team-name, secret and error-reason strings.
pub const STRING_SIZE: usize = 50;
/// Largest legal inbound frame (LOGIN).
pub const MAX_INBOUND_FRAME: usize = LOGIN_SIZE;

pub const AMEND_ORDER_SIZE: usize = HEADER_SIZE + 8;
pub const CANCEL_ORDER_SIZE: usize = HEADER_SIZE + 4;
pub const ERROR_SIZE: usize = HEADER_SIZE + 4 + STRING_SIZE;
pub const HEDGE_ORDER_SIZE: usize = HEADER_SIZE + 14;
pub const INSERT_ORDER_SIZE: usize = HEADER_SIZE + 15;
pub const LOGIN_SIZE: usize = HEADER_SIZE + 2 * STRING_SIZE;
pub const ORDER_BOOK_UPDATE_SIZE: usize = HEADER_SIZE + 5 + 16 * TOP_LEVEL_COUNT;
pub const ORDER_FILLED_SIZE: usize = HEADER_SIZE + 12;
pub const ORDER_STATUS_SIZE: usize = HEADER_SIZE + 16;
pub const POSITION_CHANGE_SIZE: usize = HEADER_SIZE + 5;
pub const TRADE_TICKS_SIZE: usize = ORDER_BOOK_UPDATE_SIZE;

/// Message type bytes, assigned alphabetically by message name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum MessageType {
    AmendOrder = 1,
    CancelOrder = 2,
    Error = 3,
    HedgeOrder = 4,
    InsertOrder = 5,
    Login = 6,
    OrderBookUpdate = 7,
    OrderFilled = 8,
    OrderStatus = 9,
    PositionChange = 10,
    TradeTicks = 11,
}

/// Framing and decoding failures; all of them close the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The type byte is not a known client message.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// The frame length does not match the fixed size for its type.
    #[error("bad length {length} for message type {message_type} (expected {expected})")]
    BadLength {
        /// Type byte of the offending frame.
        message_type: u8,
        /// Length field as received.
        length: usize,
        /// Fixed size for this type.
        expected: usize,
    },

    /// An enum field carried an out-of-range value.
    #[error("bad value {value} for {field}")]
    BadEnum {
        /// Which field failed to decode.
        field: &'static str,
        /// The offending byte.
        value: u8,
    },

    /// A fixed-width string was not valid UTF-8.
    #[error("string field is not valid utf-8")]
    BadString,
}

/// Messages a competitor sends to the exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Authentication handshake; must be the first frame on a connection.
    Login {
        team: String,
        secret: String,
    },
    InsertOrder {
        client_order_id: u32,
        instrument: Instrument,
        side: Side,
        price: u32,
        volume: u32,
        lifespan: Lifespan,
    },
    AmendOrder {
        client_order_id: u32,
        new_volume: u32,
    },
    CancelOrder {
        client_order_id: u32,
    },
    HedgeOrder {
        client_order_id: u32,
        instrument: Instrument,
        side: Side,
        price: u32,
        volume: u32,
    },
}

/// Messages the exchange sends to a competitor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    Error {
        /// Offending order, or zero for session-level errors.
        client_order_id: u32,
        reason: String,
    },
    OrderFilled {
        client_order_id: u32,
        price: u32,
        volume: u32,
    },
    OrderStatus {
        client_order_id: u32,
        fill_volume: u32,
        remaining_volume: u32,
        fees: i32,
    },
    PositionChange {
        instrument: Instrument,
        position: i32,
    },
}

/// Datagrams published on the information channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InfoMessage {
    OrderBookUpdate {
        instrument: Instrument,
        tick_number: u32,
        levels: TopLevels,
    },
    TradeTicks {
        instrument: Instrument,
        sequence_number: u32,
        levels: TopLevels,
    },
}

/// Decode one client frame from its type byte and body (header stripped).
/// `length` is the frame's length field, validated against the fixed size.
pub fn decode_client(
    message_type: u8,
    length: usize,
    body: &[u8],
) -> Result<ClientMessage, FrameError> {
    let check = |expected: usize| -> Result<(), FrameError> {
        if length != expected || body.len() != expected - HEADER_SIZE {
            Err(FrameError::BadLength {
                message_type,
                length,
                expected,
            })
        } else {
            Ok(())
        }
    };

    match message_type {
        t if t == MessageType::Login as u8 => {
            check(LOGIN_SIZE)?;
            Ok(ClientMessage::Login {
                team: get_string(&body[0..STRING_SIZE])?,
                secret: get_string(&body[STRING_SIZE..2 * STRING_SIZE])?,
            })
        }
        t if t == MessageType::InsertOrder as u8 => {
            check(INSERT_ORDER_SIZE)?;
            Ok(ClientMessage::InsertOrder {
                client_order_id: get_u32(body, 0),
                instrument: Instrument::from_wire(body[4]).ok_or(FrameError::BadEnum {
                    field: "instrument",
                    value: body[4],
                })?,
                side: Side::from_wire(body[5]).ok_or(FrameError::BadEnum {
                    field: "side",
                    value: body[5],
                })?,
                price: get_u32(body, 6),
                volume: get_u32(body, 10),
                lifespan: Lifespan::from_wire(body[14]).ok_or(FrameError::BadEnum {
                    field: "lifespan",
                    value: body[14],
                })?,
            })
        }
        t if t == MessageType::AmendOrder as u8 => {
            check(AMEND_ORDER_SIZE)?;
            Ok(ClientMessage::AmendOrder {
                client_order_id: get_u32(body, 0),
                new_volume: get_u32(body, 4),
            })
        }
        t if t == MessageType::CancelOrder as u8 => {
            check(CANCEL_ORDER_SIZE)?;
            Ok(ClientMessage::CancelOrder {
                client_order_id: get_u32(body, 0),
            })
        }
        t if t == MessageType::HedgeOrder as u8 => {
            check(HEDGE_ORDER_SIZE)?;
            Ok(ClientMessage::HedgeOrder {
                client_order_id: get_u32(body, 0),
                instrument: Instrument::from_wire(body[4]).ok_or(FrameError::BadEnum {
                    field: "instrument",
                    value: body[4],
                })?,
                side: Side::from_wire(body[5]).ok_or(FrameError::BadEnum {
                    field: "side",
                    value: body[5],
                })?,
                price: get_u32(body, 6),
                volume: get_u32(body, 10),
            })
        }
        other => Err(FrameError::UnknownMessageType(other)),
    }
}

/// Encode one server frame, header included.
#[must_use]
pub fn encode_server(message: &ServerMessage) -> Vec<u8> {
    match message {
        ServerMessage::Error {
            client_order_id,
            reason,
        } => {
            let mut frame = header(ERROR_SIZE, MessageType::Error);
            put_u32(&mut frame, *client_order_id);
            put_string(&mut frame, reason);
            frame
        }
        ServerMessage::OrderFilled {
            client_order_id,
            price,
            volume,
        } => {
            let mut frame = header(ORDER_FILLED_SIZE, MessageType::OrderFilled);
            put_u32(&mut frame, *client_order_id);
            put_u32(&mut frame, *price);
            put_u32(&mut frame, *volume);
            frame
        }
        ServerMessage::OrderStatus {
            client_order_id,
            fill_volume,
            remaining_volume,
            fees,
        } => {
            let mut frame = header(ORDER_STATUS_SIZE, MessageType::OrderStatus);
            put_u32(&mut frame, *client_order_id);
            put_u32(&mut frame, *fill_volume);
            put_u32(&mut frame, *remaining_volume);
            frame.extend_from_slice(&fees.to_be_bytes());
            frame
        }
        ServerMessage::PositionChange {
            instrument,
            position,
        } => {
            let mut frame = header(POSITION_CHANGE_SIZE, MessageType::PositionChange);
            frame.push(*instrument as u8);
            frame.extend_from_slice(&position.to_be_bytes());
            frame
        }
    }
}

/// Encode one information datagram, header included.
#[must_use]
pub fn encode_info(message: &InfoMessage) -> Vec<u8> {
    let (message_type, instrument, number, levels) = match message {
        InfoMessage::OrderBookUpdate {
            instrument,
            tick_number,
            levels,
        } => (MessageType::OrderBookUpdate, instrument, tick_number, levels),
        InfoMessage::TradeTicks {
            instrument,
            sequence_number,
            levels,
        } => (MessageType::TradeTicks, instrument, sequence_number, levels),
    };
    let mut frame = header(ORDER_BOOK_UPDATE_SIZE, message_type);
    frame.push(*instrument as u8);
    put_u32(&mut frame, *number);
    for value in levels
        .ask_prices
        .iter()
        .chain(levels.ask_volumes.iter())
        .chain(levels.bid_prices.iter())
        .chain(levels.bid_volumes.iter())
    {
        put_u32(&mut frame, *value);
    }
    frame
}

/// Decode an information datagram; used by tests and replay tooling.
pub fn decode_info(datagram: &[u8]) -> Result<InfoMessage, FrameError> {
    if datagram.len() != ORDER_BOOK_UPDATE_SIZE {
        return Err(FrameError::BadLength {
            message_type: datagram.get(2).copied().unwrap_or(0),
            length: datagram.len(),
            expected: ORDER_BOOK_UPDATE_SIZE,
        });
    }
    let message_type = datagram[2];
    let body = &datagram[HEADER_SIZE..];
    let instrument = Instrument::from_wire(body[0]).ok_or(FrameError::BadEnum {
        field: "instrument",
        value: body[0],
    })?;
    let number = get_u32(body, 1);
    let mut levels = TopLevels::default();
    let base = 5;
    for i in 0..TOP_LEVEL_COUNT {
        levels.ask_prices[i] = get_u32(body, base + 4 * i);
        levels.ask_volumes[i] = get_u32(body, base + 4 * (TOP_LEVEL_COUNT + i));
        levels.bid_prices[i] = get_u32(body, base + 4 * (2 * TOP_LEVEL_COUNT + i));
        levels.bid_volumes[i] = get_u32(body, base + 4 * (3 * TOP_LEVEL_COUNT + i));
    }
    match message_type {
        t if t == MessageType::OrderBookUpdate as u8 => Ok(InfoMessage::OrderBookUpdate {
            instrument,
            tick_number: number,
            levels,
        }),
        t if t == MessageType::TradeTicks as u8 => Ok(InfoMessage::TradeTicks {
            instrument,
            sequence_number: number,
            levels,
        }),
        other => Err(FrameError::UnknownMessageType(other)),
    }
}

fn header(size: usize, message_type: MessageType) -> Vec<u8> {
    let mut frame = Vec::with_capacity(size);
    frame.extend_from_slice(&(size as u16).to_be_bytes());
    frame.push(message_type as u8);
    frame
}

#[inline]
fn put_u32(frame: &mut Vec<u8>, value: u32) {
    frame.extend_from_slice(&value.to_be_bytes());
}

#[inline]
fn get_u32(body: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&body[offset..offset + 4]);
    u32::from_be_bytes(bytes)
}

fn put_string(frame: &mut Vec<u8>, value: &str) {
    let bytes = value.as_bytes();
    let take = bytes.len().min(STRING_SIZE);
    frame.extend_from_slice(&bytes[..take]);
    frame.resize(frame.len() + STRING_SIZE - take, 0);
}

fn get_string(field: &[u8]) -> Result<String, FrameError> {
    let end = field
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| FrameError::BadString)
}

/// Build an outbound client frame; used by tests and autotrader tooling.
#[must_use]
pub fn encode_client(message: &ClientMessage) -> Vec<u8> {
    match message {
        ClientMessage::Login { team, secret } => {
            let mut frame = header(LOGIN_SIZE, MessageType::Login);
            put_string(&mut frame, team);
            put_string(&mut frame, secret);
            frame
        }
        ClientMessage::InsertOrder {
            client_order_id,
            instrument,
            side,
            price,
            volume,
            lifespan,
        } => {
            let mut frame = header(INSERT_ORDER_SIZE, MessageType::InsertOrder);
            put_u32(&mut frame, *client_order_id);
            frame.push(*instrument as u8);
            frame.push(*side as u8);
            put_u32(&mut frame, *price);
            put_u32(&mut frame, *volume);
            frame.push(*lifespan as u8);
            frame
        }
        ClientMessage::AmendOrder {
            client_order_id,
            new_volume,
        } => {
            let mut frame = header(AMEND_ORDER_SIZE, MessageType::AmendOrder);
            put_u32(&mut frame, *client_order_id);
            put_u32(&mut frame, *new_volume);
            frame
        }
        ClientMessage::CancelOrder { client_order_id } => {
            let mut frame = header(CANCEL_ORDER_SIZE, MessageType::CancelOrder);
            put_u32(&mut frame, *client_order_id);
            frame
        }
        ClientMessage::HedgeOrder {
            client_order_id,
            instrument,
            side,
            price,
            volume,
        } => {
            let mut frame = header(HEDGE_ORDER_SIZE, MessageType::HedgeOrder);
            put_u32(&mut frame, *client_order_id);
            frame.push(*instrument as u8);
            frame.push(*side as u8);
            put_u32(&mut frame, *price);
            put_u32(&mut frame, *volume);
            frame
        }
    }
}
