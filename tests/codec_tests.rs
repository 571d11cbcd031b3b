//! Wire codec tests: frame layout, fixed-width strings, framing errors.

use exchange_sim::messages::{
    decode_client, decode_info, encode_client, encode_info, encode_server, ClientMessage,
    FrameError, InfoMessage, MessageType, ServerMessage, ERROR_SIZE, HEADER_SIZE,
    INSERT_ORDER_SIZE, LOGIN_SIZE, ORDER_BOOK_UPDATE_SIZE, POSITION_CHANGE_SIZE,
};
use exchange_sim::orderbook::TopLevels;
use exchange_sim::types::{Instrument, Lifespan, Side};

fn round_trip(message: ClientMessage) -> ClientMessage {
    let frame = encode_client(&message);
    let length = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    assert_eq!(length, frame.len(), "length field counts the whole frame");
    decode_client(frame[2], length, &frame[HEADER_SIZE..]).unwrap()
}

#[test]
fn client_messages_round_trip() {
    let messages = [
        ClientMessage::Login {
            team: "TeamOne".to_string(),
            secret: "hunter2".to_string(),
        },
        ClientMessage::InsertOrder {
            client_order_id: 42,
            instrument: Instrument::Etf,
            side: Side::Buy,
            price: 10_000,
            volume: 3,
            lifespan: Lifespan::GoodForDay,
        },
        ClientMessage::AmendOrder {
            client_order_id: 42,
            new_volume: 1,
        },
        ClientMessage::CancelOrder {
            client_order_id: 42,
        },
        ClientMessage::HedgeOrder {
            client_order_id: 7,
            instrument: Instrument::Future,
            side: Side::Sell,
            price: 9_900,
            volume: 5,
        },
    ];
    for message in messages {
        assert_eq!(round_trip(message.clone()), message);
    }
}

#[test]
fn login_strings_are_fixed_width_zero_padded() {
    let frame = encode_client(&ClientMessage::Login {
        team: "T1".to_string(),
        secret: "s".to_string(),
    });
    assert_eq!(frame.len(), LOGIN_SIZE);
    // Team field: 2 bytes of name, 48 of padding.
    assert_eq!(&frame[HEADER_SIZE..HEADER_SIZE + 2], b"T1");
    assert!(frame[HEADER_SIZE + 2..HEADER_SIZE + 50].iter().all(|b| *b == 0));
    assert_eq!(frame[HEADER_SIZE + 50], b's');
}

#[test]
fn insert_order_layout_is_big_endian() {
    let frame = encode_client(&ClientMessage::InsertOrder {
        client_order_id: 0x0102_0304,
        instrument: Instrument::Etf,
        side: Side::Buy,
        price: 10_000,
        volume: 3,
        lifespan: Lifespan::FillAndKill,
    });
    assert_eq!(frame.len(), INSERT_ORDER_SIZE);
    assert_eq!(frame[0..2], (INSERT_ORDER_SIZE as u16).to_be_bytes());
    assert_eq!(frame[2], MessageType::InsertOrder as u8);
    assert_eq!(&frame[3..7], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(frame[7], 1, "ETF");
    assert_eq!(frame[8], 1, "BUY");
    assert_eq!(&frame[9..13], &10_000u32.to_be_bytes());
    assert_eq!(&frame[13..17], &3u32.to_be_bytes());
    assert_eq!(frame[17], 0, "FAK");
}

#[test]
fn wrong_length_is_a_framing_error() {
    let frame = encode_client(&ClientMessage::CancelOrder { client_order_id: 1 });
    let err = decode_client(frame[2], frame.len() + 1, &frame[HEADER_SIZE..]).unwrap_err();
    assert!(matches!(err, FrameError::BadLength { .. }));
}

#[test]
fn unknown_type_is_a_framing_error() {
    assert_eq!(
        decode_client(99, HEADER_SIZE, &[]),
        Err(FrameError::UnknownMessageType(99))
    );
    // Server-to-client types are not valid inbound.
    let err = decode_client(MessageType::OrderFilled as u8, 15, &[0; 12]).unwrap_err();
    assert_eq!(err, FrameError::UnknownMessageType(MessageType::OrderFilled as u8));
}

#[test]
fn bad_enum_value_is_rejected() {
    let mut frame = encode_client(&ClientMessage::InsertOrder {
        client_order_id: 1,
        instrument: Instrument::Etf,
        side: Side::Buy,
        price: 10_000,
        volume: 3,
        lifespan: Lifespan::GoodForDay,
    });
    frame[8] = 9; // side
    let err = decode_client(frame[2], frame.len(), &frame[HEADER_SIZE..]).unwrap_err();
    assert_eq!(
        err,
        FrameError::BadEnum {
            field: "side",
            value: 9
        }
    );
}

#[test]
fn server_error_frame_carries_padded_reason() {
    let frame = encode_server(&ServerMessage::Error {
        client_order_id: 0,
        reason: "MessageRateExceeded".to_string(),
    });
    assert_eq!(frame.len(), ERROR_SIZE);
    assert_eq!(frame[2], MessageType::Error as u8);
    assert_eq!(&frame[3..7], &[0; 4]);
    assert_eq!(&frame[7..26], b"MessageRateExceeded");
    assert!(frame[26..].iter().all(|b| *b == 0));
}

#[test]
fn position_change_encodes_signed_positions() {
    let frame = encode_server(&ServerMessage::PositionChange {
        instrument: Instrument::Etf,
        position: -3,
    });
    assert_eq!(frame.len(), POSITION_CHANGE_SIZE);
    assert_eq!(frame[3], 1);
    assert_eq!(&frame[4..8], &(-3i32).to_be_bytes());
}

#[test]
fn info_messages_round_trip() {
    let mut levels = TopLevels::default();
    levels.ask_prices[0] = 10_000;
    levels.ask_volumes[0] = 7;
    levels.bid_prices[0] = 9_900;
    levels.bid_volumes[0] = 12;

    for message in [
        InfoMessage::OrderBookUpdate {
            instrument: Instrument::Etf,
            tick_number: 17,
            levels,
        },
        InfoMessage::TradeTicks {
            instrument: Instrument::Future,
            sequence_number: 1,
            levels,
        },
    ] {
        let datagram = encode_info(&message);
        assert_eq!(datagram.len(), ORDER_BOOK_UPDATE_SIZE);
        assert_eq!(decode_info(&datagram).unwrap(), message);
    }
}

#[test]
fn truncated_datagram_is_rejected() {
    let datagram = encode_info(&InfoMessage::OrderBookUpdate {
        instrument: Instrument::Etf,
        tick_number: 1,
        levels: TopLevels::default(),
    });
    assert!(decode_info(&datagram[..datagram.len() - 1]).is_err());
}
