//! UseCase: キャンバス情報の取得（`/info`, `/boarddata`）

use std::sync::Arc;

use crate::domain::Canvas;

/// ログイン手段の表示用情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthService {
    pub id: String,
    pub name: String,
}

/// 起動時に決まるキャンバスの公開設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasSettings {
    pub canvas_code: String,
    pub max_stacked: u32,
    pub auth_services: Vec<AuthService>,
    pub registration_enabled: bool,
}

/// `/info` の内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasInfo {
    pub canvas_code: String,
    pub width: u32,
    pub height: u32,
    /// `#RRGGBB`
    pub palette: Vec<String>,
    pub max_stacked: u32,
    pub auth_services: Vec<AuthService>,
    pub registration_enabled: bool,
}

/// キャンバス情報取得のユースケース
pub struct GetCanvasUseCase {
    canvas: Arc<Canvas>,
    settings: CanvasSettings,
}

impl GetCanvasUseCase {
    pub fn new(canvas: Arc<Canvas>, settings: CanvasSettings) -> Self {
        Self { canvas, settings }
    }

    pub fn info(&self) -> CanvasInfo {
        CanvasInfo {
            canvas_code: self.settings.canvas_code.clone(),
            width: self.canvas.width(),
            height: self.canvas.height(),
            palette: self.canvas.palette().to_hex_strings(),
            max_stacked: self.settings.max_stacked,
            auth_services: self.settings.auth_services.clone(),
            registration_enabled: self.settings.registration_enabled,
        }
    }

    /// 1 セル 1 バイトの row-major なバイト列
    pub fn board_data(&self) -> Vec<u8> {
        self.canvas.serialize()
    }
}
