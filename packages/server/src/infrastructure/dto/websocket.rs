//! WebSocket message DTOs.

use serde::{Deserialize, Serialize};

/// `type` field of every WebSocket message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "userinfo")]
    UserInfo,
    #[serde(rename = "pixels")]
    Pixels,
    #[serde(rename = "cooldown")]
    Cooldown,
    #[serde(rename = "ACK")]
    Ack,
    #[serde(rename = "pixel")]
    Pixel,
}

// ========================================
// Client → Server
// ========================================

/// Only the `type` field; parsed first to route the message.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub r#type: String,
}

impl Envelope {
    /// `type` is exactly `"pixel"`; the only message a client may send.
    pub fn is_pixel(&self) -> bool {
        self.r#type == "pixel"
    }
}

/// `{"type":"pixel","x":..,"y":..,"color":..}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PixelRequest {
    pub x: u32,
    pub y: u32,
    pub color: u8,
}

// ========================================
// Server → Client
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfoMessage {
    pub r#type: MessageType,
    pub method: String,
    pub role: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelsAvailableMessage {
    pub r#type: MessageType,
    pub count: u32,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownMessage {
    pub r#type: MessageType,
    /// seconds
    pub wait: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    pub r#type: MessageType,
    #[serde(rename = "ackFor")]
    pub ack_for: String,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelInfo {
    pub x: u32,
    pub y: u32,
    pub color: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelMessage {
    pub r#type: MessageType,
    pub pixels: Vec<PixelInfo>,
}
