//! Server state shared by every handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::ConnectionKeyMode,
    usecase::{
        ConnectClientUseCase, DisconnectClientUseCase, GetCanvasUseCase, PlacePixelUseCase,
        ResolveSessionUseCase,
    },
};

/// Shared application state
pub struct AppState {
    /// ConnectClientUseCase（クライアント接続のユースケース）
    pub connect_client_usecase: Arc<ConnectClientUseCase>,
    /// DisconnectClientUseCase（クライアント切断のユースケース）
    pub disconnect_client_usecase: Arc<DisconnectClientUseCase>,
    /// ResolveSessionUseCase（セッション解決のユースケース）
    pub resolve_session_usecase: Arc<ResolveSessionUseCase>,
    /// PlacePixelUseCase（ピクセル配置のユースケース）
    pub place_pixel_usecase: Arc<PlacePixelUseCase>,
    /// GetCanvasUseCase（キャンバス情報取得のユースケース）
    pub get_canvas_usecase: Arc<GetCanvasUseCase>,
    /// 接続を登録するキーの種類
    pub connection_key_mode: ConnectionKeyMode,
    /// セッショントークンを入れる Cookie の名前
    pub token_cookie: String,
    /// サーバー停止で発火する。各接続のキャンセルはこの子トークン
    pub shutdown: CancellationToken,
}
