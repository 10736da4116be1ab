//! Operator console: line-oriented commands read from stdin.

use std::sync::Arc;

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tsubu_shared::time::{Clock, timestamp_to_rfc3339};

use crate::{domain::MessagePusher, usecase::SaveCanvasUseCase};

const HELP: &str = "commands: save, online, help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// キャンバスをスナップショットファイルに保存
    Save,
    /// 接続数を表示
    Online,
    Help,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> ConsoleCommand {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return ConsoleCommand::Empty;
    };
    match command.to_ascii_lowercase().as_str() {
        "save" => ConsoleCommand::Save,
        "online" => ConsoleCommand::Online,
        "help" => ConsoleCommand::Help,
        _ => ConsoleCommand::Unknown(command.to_string()),
    }
}

pub struct Console {
    save_canvas_usecase: Arc<SaveCanvasUseCase>,
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl Console {
    pub fn new(
        save_canvas_usecase: Arc<SaveCanvasUseCase>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            save_canvas_usecase,
            message_pusher,
            clock,
        }
    }

    /// コマンドを実行し、表示する文字列を返す
    pub async fn execute(&self, command: ConsoleCommand) -> String {
        match command {
            ConsoleCommand::Save => match self.save_canvas_usecase.execute().await {
                Ok(bytes) => {
                    let at = timestamp_to_rfc3339(self.clock.now_millis()).unwrap_or_default();
                    format!("Saved canvas ({} bytes) at {}", bytes, at)
                }
                Err(e) => {
                    tracing::error!("Console save failed: {}", e);
                    format!("Save failed: {}", e)
                }
            },
            ConsoleCommand::Online => {
                format!("{} online", self.message_pusher.online_count())
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Empty => String::new(),
            ConsoleCommand::Unknown(command) => format!("{} is not a command", command),
        }
    }

    /// stdin を 1 行ずつ読み、`cancel` か EOF まで処理する
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = lines.next_line() => line,
                };
                match line {
                    Ok(Some(line)) => {
                        let output = self.execute(parse_command(&line)).await;
                        if !output.is_empty() {
                            println!("{}", output);
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        })
    }
}
