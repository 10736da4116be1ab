//! Conversion logic between DTOs and domain types.

use crate::domain::{Pixel, ServerEvent};
use crate::infrastructure::dto::websocket as dto;

/// `ackFor` value of placement acknowledgements.
pub const ACK_FOR_PLACE: &str = "PLACE";

// ========================================
// DTO → Domain
// ========================================

impl From<dto::PixelRequest> for Pixel {
    fn from(req: dto::PixelRequest) -> Self {
        Self {
            x: req.x,
            y: req.y,
            color: req.color,
        }
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<Pixel> for dto::PixelInfo {
    fn from(pixel: Pixel) -> Self {
        Self {
            x: pixel.x,
            y: pixel.y,
            color: pixel.color,
        }
    }
}

/// Encode a domain event as the JSON text sent over the WebSocket.
pub fn encode_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    match event {
        ServerEvent::UserInfo {
            method,
            role,
            username,
        } => serde_json::to_string(&dto::UserInfoMessage {
            r#type: dto::MessageType::UserInfo,
            method: method.clone(),
            role: role.as_str().to_string(),
            username: username.clone(),
        }),
        ServerEvent::PixelsAvailable { count, cause } => {
            serde_json::to_string(&dto::PixelsAvailableMessage {
                r#type: dto::MessageType::Pixels,
                count: *count,
                cause: cause.as_str().to_string(),
            })
        }
        ServerEvent::Cooldown { wait } => serde_json::to_string(&dto::CooldownMessage {
            r#type: dto::MessageType::Cooldown,
            wait: wait.as_secs_f32(),
        }),
        ServerEvent::PlacementAck { x, y } => serde_json::to_string(&dto::AckMessage {
            r#type: dto::MessageType::Ack,
            ack_for: ACK_FOR_PLACE.to_string(),
            x: *x,
            y: *y,
        }),
        ServerEvent::PixelsPlaced(pixels) => serde_json::to_string(&dto::PixelMessage {
            r#type: dto::MessageType::Pixel,
            pixels: pixels.iter().copied().map(dto::PixelInfo::from).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Role, StackCause};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn encode_value(event: &ServerEvent) -> Value {
        serde_json::from_str(&encode_event(event).unwrap()).unwrap()
    }

    #[test]
    fn test_encode_userinfo() {
        // テスト項目: userinfo メッセージが method/role/username を持つ
        // given (前提条件):
        let event = ServerEvent::UserInfo {
            method: "ip".to_string(),
            role: Role::User,
            username: "-snip-".to_string(),
        };

        // when (操作):
        let value = encode_value(&event);

        // then (期待する結果):
        assert_eq!(
            value,
            json!({"type": "userinfo", "method": "ip", "role": "USER", "username": "-snip-"})
        );
    }

    #[test]
    fn test_encode_pixels_available_causes() {
        // テスト項目: pixels メッセージの cause がクライアントの期待する名前になる
        // given (前提条件):
        let causes = [
            (StackCause::Auth, "auth"),
            (StackCause::Connected, "connected"),
            (StackCause::StackGain, "stackGain"),
            (StackCause::Consume, "consume"),
        ];

        // when (操作) / then (期待する結果):
        for (cause, expected) in causes {
            let value = encode_value(&ServerEvent::PixelsAvailable { count: 2, cause });
            assert_eq!(value, json!({"type": "pixels", "count": 2, "cause": expected}));
        }
    }

    #[test]
    fn test_encode_cooldown_in_seconds() {
        // テスト項目: cooldown の wait は秒単位の小数になる
        // given (前提条件):
        let event = ServerEvent::Cooldown {
            wait: Duration::from_millis(1500),
        };

        // when (操作):
        let value = encode_value(&event);

        // then (期待する結果):
        assert_eq!(value["type"], "cooldown");
        assert_eq!(value["wait"].as_f64(), Some(1.5));
    }

    #[test]
    fn test_encode_ack_and_pixel() {
        // テスト項目: ACK と pixel ブロードキャストの形式
        // given (前提条件):
        let ack = ServerEvent::PlacementAck { x: 3, y: 4 };
        let placed = ServerEvent::PixelsPlaced(vec![Pixel {
            x: 3,
            y: 4,
            color: 5,
        }]);

        // when (操作):
        let ack = encode_value(&ack);
        let placed = encode_value(&placed);

        // then (期待する結果):
        assert_eq!(ack, json!({"type": "ACK", "ackFor": "PLACE", "x": 3, "y": 4}));
        assert_eq!(
            placed,
            json!({"type": "pixel", "pixels": [{"x": 3, "y": 4, "color": 5}]})
        );
    }

    #[test]
    fn test_pixel_request_rejects_out_of_range_fields() {
        // テスト項目: 負の座標や 255 を超える色はペイロードとして不正になる
        // given (前提条件):
        let inputs = [
            r#"{"type":"pixel","x":-1,"y":0,"color":0}"#,
            r#"{"type":"pixel","x":0,"y":0,"color":256}"#,
            r#"{"type":"pixel","x":0,"color":1}"#,
        ];

        // when (操作) / then (期待する結果):
        for input in inputs {
            assert!(serde_json::from_str::<dto::PixelRequest>(input).is_err());
        }
        let ok: dto::PixelRequest =
            serde_json::from_str(r#"{"type":"pixel","x":1,"y":2,"color":3}"#).unwrap();
        assert_eq!(Pixel::from(ok), Pixel { x: 1, y: 2, color: 3 });
    }

    #[test]
    fn test_envelope_routes_only_pixel_messages() {
        // テスト項目: type が "pixel" の場合だけ配置メッセージとして扱う
        // given (前提条件):
        let inputs = [
            r#"{"type":"pixel","x":1}"#,
            r#"{"type":"Pixel"}"#,
            r#"{"type":"pixels"}"#,
            r#"{"type":"chat","message":"hi"}"#,
        ];

        // when (操作):
        let routed: Vec<bool> = inputs
            .iter()
            .map(|input| {
                serde_json::from_str::<dto::Envelope>(input)
                    .unwrap()
                    .is_pixel()
            })
            .collect();

        // then (期待する結果):
        assert_eq!(routed, vec![true, false, false, false]);
        assert!(serde_json::from_str::<dto::Envelope>(r#"{"x":1}"#).is_err());
    }
}
