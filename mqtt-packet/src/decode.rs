use core::convert::TryFrom;
use core::str;

use nom::{
    bytes::complete::{tag, take, take_while_m_n},
    combinator::{all_consuming, cond, map, map_opt, map_res, recognize, rest, verify},
    error::{context, ParseError, VerboseError},
    multi::{length_data, many1},
    number::complete::{be_u16, be_u8},
    sequence::{pair, tuple},
    IResult,
};

use crate::mqtt::{self, ConnectReturnCode, Error, PacketId, QoS};
use crate::packet::*;

impl FixedHeader {
    fn parse<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Self, E> {
        map(
            tuple((
                map_res(
                    be_u8,
                    |b| -> Result<_, num_enum::TryFromPrimitiveError<Type>> {
                        let packet_type = Type::try_from((b >> 4) & 0x0F)?;
                        let packet_flags = b & 0x0F;

                        Ok((packet_type, packet_flags))
                    },
                ),
                varint,
            )),
            |((packet_type, packet_flags), remaining_length)| FixedHeader {
                packet_type,
                packet_flags,
                remaining_length,
            },
        )(input)
    }
}

const CONTINUATION_BIT: u8 = 0x80;

fn varint<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], usize, E> {
    context(
        "variable length",
        map(
            verify(
                recognize(pair(
                    take_while_m_n(0, 3, |b| (b & CONTINUATION_BIT) != 0),
                    verify(be_u8, |b| (b & CONTINUATION_BIT) == 0),
                )),
                |s: &[u8]| s.len() <= 4,
            ),
            |s: &[u8]| {
                s.iter().enumerate().fold(0, |value, (i, b)| {
                    value + (usize::from(*b & !CONTINUATION_BIT) << (7 * i))
                })
            },
        ),
    )(input)
}

/// Text fields in the Control Packets are encoded as UTF-8 strings, each
/// preceded by a two byte length.
fn utf8_str<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context("utf8 string", map_res(length_data(be_u16), str::from_utf8))(input)
}

fn binary_data<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a [u8], E> {
    context("binary data", length_data(be_u16))(input)
}

const CLIENT_ID_MAX_LEN: usize = 23;

/// The Client Identifier identifies the Client to the Server; allowed to be
/// empty only when the Server is expected to assign one (not used by this
/// client, which always generates its own identifier before connecting).
fn client_id<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context(
        "client id",
        verify(utf8_str, |s: &str| s.len() <= CLIENT_ID_MAX_LEN),
    )(input)
}

fn topic_name<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context("topic name", utf8_str)(input)
}

fn topic_filter<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a str, E> {
    context("topic filter", utf8_str)(input)
}

fn packet_id<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], PacketId, E> {
    context("packet id", be_u16)(input)
}

fn subscription<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], (&'a str, QoS), E> {
    context(
        "subscription",
        tuple((topic_filter, map_res(be_u8, QoS::try_from))),
    )(input)
}

/// Parses exactly one MQTT Control Packet out of a complete, already
/// length-delimited buffer (the fixed header's remaining length must equal
/// `input.len()` after the header is consumed).
///
/// Returns the parsed packet and the number of bytes of `input` it consumed.
/// Malformed or truncated input is reported as [`Error::ReadError`]; the
/// nom-level diagnostics are not exposed across the codec boundary.
pub fn parse(input: &[u8]) -> mqtt::Result<(Packet<'_>, usize)> {
    parse_verbose(input).map_err(|_| Error::ReadError)
}

fn parse_verbose(input: &[u8]) -> IResult<&[u8], (Packet<'_>, usize), VerboseError<&[u8]>> {
    let original_len = input.len();
    let (rest, fixed_header) = FixedHeader::parse(input)?;
    let (rest, body) = take(fixed_header.remaining_length)(rest)?;
    let consumed = original_len - rest.len();

    let packet = match fixed_header.packet_type {
        Type::CONNECT => context("Connect", all_consuming(map(connect, Packet::Connect)))(body),
        Type::CONNACK => {
            context("ConnectAck", all_consuming(map(connect_ack, Packet::ConnectAck)))(body)
        }
        Type::PUBLISH => context(
            "Publish",
            all_consuming(map(
                |input| publish(input, PublishFlags::from_bits_truncate(fixed_header.packet_flags)),
                Packet::Publish,
            )),
        )(body),
        Type::PUBACK => {
            context("PublishAck", all_consuming(map(publish_ack, Packet::PublishAck)))(body)
        }
        Type::PUBREC => context(
            "PublishReceived",
            all_consuming(map(publish_received, Packet::PublishReceived)),
        )(body),
        Type::PUBREL => context(
            "PublishRelease",
            all_consuming(map(publish_received, |p| {
                Packet::PublishRelease(PublishRelease {
                    packet_id: p.packet_id,
                })
            })),
        )(body),
        Type::PUBCOMP => {
            // The client never sends PUBREL, so no broker ever has cause to send this.
            Err(nom::Err::Error(VerboseError::from_error_kind(
                body,
                nom::error::ErrorKind::Verify,
            )))
        }
        Type::SUBSCRIBE => {
            context("Subscribe", all_consuming(map(subscribe, Packet::Subscribe)))(body)
        }
        Type::SUBACK => {
            context("SubscribeAck", all_consuming(map(subscribe_ack, Packet::SubscribeAck)))(body)
        }
        Type::UNSUBSCRIBE => context(
            "Unsubscribe",
            all_consuming(map(unsubscribe, Packet::Unsubscribe)),
        )(body),
        Type::UNSUBACK => context(
            "UnsubscribeAck",
            all_consuming(map(unsubscribe_ack, Packet::UnsubscribeAck)),
        )(body),
        Type::PINGREQ => context("Ping", map(all_consuming(rest_all), |_| Packet::Ping))(body),
        Type::PINGRESP => context("Pong", map(all_consuming(rest_all), |_| Packet::Pong))(body),
        Type::DISCONNECT => {
            context("Disconnect", map(all_consuming(rest_all), |_| Packet::Disconnect))(body)
        }
    }?;

    Ok((rest, (packet.1, consumed)))
}

fn rest_all<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], &'a [u8], E> {
    rest(input)
}

fn connect<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Connect<'a>, E> {
    let (input, (_, _, flags, keep_alive)) = tuple((
        context("protocol name", tag(PROTOCOL_NAME)),
        context("protocol level", verify(be_u8, |&b| b == PROTOCOL_LEVEL)),
        context("flags", map_opt(be_u8, ConnectFlags::from_bits)),
        context("keepalive", be_u16),
    ))(input)?;

    let (input, (client_id, last_will, username, password)) = tuple((
        client_id,
        cond(
            flags.contains(ConnectFlags::LAST_WILL),
            context(
                "will",
                map(
                    tuple((
                        context("will topic", utf8_str),
                        context("will message", binary_data),
                    )),
                    move |(topic, message)| LastWill {
                        qos: flags.qos().unwrap_or_default(),
                        retain: flags.contains(ConnectFlags::WILL_RETAIN),
                        topic,
                        message,
                    },
                ),
            ),
        ),
        cond(
            flags.contains(ConnectFlags::USERNAME),
            context("username", utf8_str),
        ),
        cond(
            flags.contains(ConnectFlags::PASSWORD),
            context("password", binary_data),
        ),
    ))(input)?;

    Ok((
        input,
        Connect {
            clean_session: flags.contains(ConnectFlags::CLEAN_SESSION),
            keep_alive,
            client_id,
            last_will,
            username,
            password,
        },
    ))
}

fn connect_ack<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], ConnectAck, E> {
    map(
        tuple((
            context("flags", map_opt(be_u8, ConnectAckFlags::from_bits)),
            context("return code", map(be_u8, |b| {
                ConnectReturnCode::from_byte(b).expect("from_byte always succeeds")
            })),
        )),
        |(flags, return_code)| ConnectAck {
            session_present: flags.contains(ConnectAckFlags::SESSION_PRESENT),
            return_code,
        },
    )(input)
}

fn publish<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
    flags: PublishFlags,
) -> IResult<&'a [u8], Publish<'a>, E> {
    let dup = flags.contains(PublishFlags::DUP);
    let qos = flags.qos().unwrap_or_default();
    let retain = flags.contains(PublishFlags::RETAIN);
    let (input, (topic, packet_id, payload)) = tuple((
        topic_name,
        cond(qos != QoS::AtMostOnce, packet_id),
        rest,
    ))(input)?;

    Ok((
        input,
        Publish {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        },
    ))
}

fn publish_ack<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], PublishAck, E> {
    map(packet_id, |packet_id| PublishAck { packet_id })(input)
}

fn publish_received<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], PublishReceived, E> {
    map(packet_id, |packet_id| PublishReceived { packet_id })(input)
}

fn subscribe<'a, E: ParseError<&'a [u8]>>(input: &'a [u8]) -> IResult<&'a [u8], Subscribe<'a>, E> {
    map(
        tuple((packet_id, many1(subscription))),
        |(packet_id, subscriptions)| Subscribe {
            packet_id,
            subscriptions,
        },
    )(input)
}

fn subscribe_ack<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], SubscribeAck, E> {
    map(
        tuple((
            packet_id,
            many1(context(
                "return code",
                map(be_u8, |b| {
                    if b == SubscribeAck::FAILURE {
                        SubscribeReturnCode::Failure
                    } else {
                        QoS::try_from(b)
                            .map(SubscribeReturnCode::Success)
                            .unwrap_or(SubscribeReturnCode::Failure)
                    }
                }),
            )),
        )),
        |(packet_id, status)| SubscribeAck { packet_id, status },
    )(input)
}

fn unsubscribe<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], Unsubscribe<'a>, E> {
    map(
        tuple((packet_id, many1(topic_filter))),
        |(packet_id, topic_filters)| Unsubscribe {
            packet_id,
            topic_filters,
        },
    )(input)
}

fn unsubscribe_ack<'a, E: ParseError<&'a [u8]>>(
    input: &'a [u8],
) -> IResult<&'a [u8], UnsubscribeAck, E> {
    map(packet_id, |packet_id| UnsubscribeAck { packet_id })(input)
}
