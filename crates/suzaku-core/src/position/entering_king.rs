//! 入玉宣言ルール（Entering King Rule）
//!
//! 宣言勝ちは詰みではなく点数計算（駒の点数と玉の敵陣進入）で決まる勝利条件。
//! どのルールで計算するかはPositionに設定しておき、`declaration_win()`が
//! 条件成立時に特殊な指し手（`Move::WIN`、トライルールでは玉の移動手）を返す。

use serde::{Deserialize, Serialize};

use crate::bitboard::{king_effect, PROMOTION_ZONE_BB};
use crate::types::{Color, Move, PieceType, Square};

use super::pos::Position;

/// 入玉宣言ルールの種類
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnteringKingRule {
    /// 入玉ルールなし
    #[default]
    None,
    /// 24点法（31点以上で宣言勝ち）
    Csa24,
    /// 27点法 = CSAルール（先手28点、後手27点）
    Csa27,
    /// トライルール（相手玉の初期位置に自玉が到達したら勝ち）
    TryRule,
}

impl Position {
    /// 宣言勝ちの判定
    ///
    /// 条件を満たしていれば`Move::WIN`（トライルールでは玉の移動手）を返し、
    /// さもなくば`Move::NONE`を返す。ルールは`set_entering_king_rule()`で
    /// 事前に設定しておくこと。
    pub fn declaration_win(&self) -> Move {
        match self.entering_king_rule {
            EnteringKingRule::None => Move::NONE,
            EnteringKingRule::TryRule => self.try_rule_win(),
            EnteringKingRule::Csa24 => self.point_rule_win(31, 31),
            EnteringKingRule::Csa27 => self.point_rule_win(28, 27),
        }
    }

    /// 点数法の宣言勝ち判定
    ///
    /// 1) 自玉が敵陣三段目以内
    /// 2) 自玉に王手がかかっていない
    /// 3) 敵陣三段目以内に玉を除いて10枚以上の自駒
    /// 4) 大駒5点・小駒1点（玉を除く、敵陣内の駒と手駒の合計）が閾値以上
    fn point_rule_win(&self, black_threshold: u32, white_threshold: u32) -> Move {
        let us = self.side_to_move();
        let ksq = self.king_square(us);

        if self.in_check() {
            return Move::NONE;
        }
        if !ksq.rank().is_promotion_zone(us) {
            return Move::NONE;
        }

        let zone = PROMOTION_ZONE_BB[us.index()];
        let zone_pieces = self.pieces_c(us) & zone;
        // 玉を除いて10枚以上
        if zone_pieces.count() < 11 {
            return Move::NONE;
        }

        let big = self.pieces(us, PieceType::Bishop)
            | self.pieces(us, PieceType::Rook)
            | self.pieces(us, PieceType::Horse)
            | self.pieces(us, PieceType::Dragon);
        let big_in_zone = (zone_pieces & big).count();
        let small_in_zone = zone_pieces.count() - 1 - big_in_zone; // 玉を除く

        let hand = self.hand(us);
        let big_in_hand = hand.count(PieceType::Bishop) + hand.count(PieceType::Rook);
        let small_in_hand = hand.count(PieceType::Pawn)
            + hand.count(PieceType::Lance)
            + hand.count(PieceType::Knight)
            + hand.count(PieceType::Silver)
            + hand.count(PieceType::Gold);

        let score = 5 * (big_in_zone + big_in_hand) + small_in_zone + small_in_hand;
        let threshold = match us {
            Color::Black => black_threshold,
            Color::White => white_threshold,
        };

        if score >= threshold {
            Move::WIN
        } else {
            Move::NONE
        }
    }

    /// トライルール: 相手玉の初期位置（先手なら5一、後手なら5九）へ
    /// 自玉を合法に動かせるならその指し手を返す
    fn try_rule_win(&self) -> Move {
        let us = self.side_to_move();
        let target = match us {
            Color::Black => Square::SQ_51,
            Color::White => Square::SQ_59,
        };
        let ksq = self.king_square(us);

        if !king_effect(ksq).contains(target) {
            return Move::NONE;
        }
        let m = Move::new_move(ksq, target, false);
        if self.pseudo_legal(m) && self.legal(m) {
            return m;
        }
        Move::NONE
    }
}
