//! 局面表現モジュール
//!
//! 将棋の局面を表現し、手の実行・巻き戻しを行う。
//!
//! - `Position`: 局面本体（盤面配列・Bitboard・手駒・手番・手数・ルール設定）
//! - `StateInfo`: 1手ごとの局面状態（Zobristハッシュ、王手情報、pin情報、
//!   捕獲駒、連続王手カウンタ、千日手分類）。スタックとして管理され、
//!   `undo_move`はレコードを捨てるだけで全派生情報を巻き戻す。
//! - `do_move` / `undo_move` / `do_null_move`: 手の実行と巻き戻し（厳密LIFO）
//! - SFEN形式の解析・出力、先後反転、32バイトパック表現
//! - pseudo_legal / legal / 打ち歩詰め判定、千日手分類、入玉宣言
//!
//! 盤面配列・Bitboard・手駒・Zobristキーは `Position` のメソッド
//! （`put_piece` / `remove_piece` / `do_move` 系）を通じて更新されることを
//! 前提とし、常に互いに整合しているように保つ。

mod entering_king;
mod legality;
mod packed;
mod pos;
mod sfen;
mod state;
mod zobrist;

pub use entering_king::EnteringKingRule;
pub use packed::{PackedSfen, PackedSfenError};
pub use pos::{Position, DEFAULT_MAX_REPETITION_PLY};
pub use sfen::{SfenError, SFEN_HIRATE};
pub use state::{ChangedPiece, DirtyPiece, HandChange, StateInfo};
pub use zobrist::{init_zobrist, zobrist_hand, zobrist_psq, zobrist_side};
