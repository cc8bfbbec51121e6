//! # suzaku-core
//!
//! 将棋エンジンの局面コアライブラリ。探索中に毎秒数百万回実行される
//! `do_move` / `undo_move` を中心に、盤面・手駒・手番と、その派生情報
//! （王手・pin・利き・Zobristハッシュ・千日手分類）を差分更新で管理する。
//!
//! ## モジュール構成
//!
//! - `types`: 基本型（Color, Square, Piece, Move, Hand, etc.）
//! - `bitboard`: ビットボード演算と利きテーブル
//! - `position`: 局面表現とdo_move/undo_move、SFEN、合法性、千日手
//!
//! ## 並行性
//!
//! `Position` とそのStateInfoスタックはスレッド間で共有しない。探索
//! ワーカーごとに独立したインスタンスを持つ。プロセス全体で共有される
//! のは読み取り専用の利きテーブルとZobristテーブルだけで、これらは
//! `init()` で（または初回参照時に）一度だけ構築される。

pub mod bitboard;
pub mod position;
pub mod types;

/// プロセス共有の読み取り専用テーブル（利き・Zobrist）を構築する。
///
/// 探索ワーカーを起動する前に一度呼んでおく。呼ばなくても初回参照時に
/// 初期化されるが、その場合は最初の数手にテーブル構築コストが乗る。
pub fn init() {
    bitboard::init_tables();
    position::init_zobrist();
}
