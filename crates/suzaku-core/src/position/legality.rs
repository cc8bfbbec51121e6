//! 指し手の合法性チェック
//!
//! - `pseudo_legal`: 盤面に対する形の検査（自殺手は含まれていてよい）
//! - `legal`: pseudo-legal前提で、玉の安全（pin・王手回避・移動先の利き）を検査
//! - `legal_drop` / `legal_pawn_drop`: 打ち歩詰めの検査
//!
//! 置換表や killer のような別局面由来の指し手は pseudo_legal() → legal() の
//! 順に通してから do_move() に渡すのが契約。

use crate::bitboard::{aligned, between_bb, pawn_effect, piece_effect, king_effect, Bitboard, FILE_BB};
use crate::types::{Color, Move, PieceType, Square};

use super::pos::Position;

impl Position {
    /// 指し手の形が現局面に対して妥当か（玉の安全は見ない）
    pub fn pseudo_legal(&self, m: Move) -> bool {
        if !m.is_ok() {
            return false;
        }

        let us = self.side_to_move();

        if m.is_drop() {
            let pt = m.drop_piece_type();
            let to = m.to();

            // 手駒にあるか
            if !self.hand(us).has(pt) {
                return false;
            }

            // 移動先が空きか
            if self.piece_on(to).is_some() {
                return false;
            }

            // 行き所のない駒を打てない
            if !drop_rank_ok(us, pt, to) {
                return false;
            }

            // 二歩
            if pt == PieceType::Pawn
                && (self.pieces(us, PieceType::Pawn) & FILE_BB[to.file().index()]).is_not_empty()
            {
                return false;
            }

            true
        } else {
            let from = m.from();
            let to = m.to();
            let pc = self.piece_on(from);

            // 移動元に自分の駒があるか
            if pc.is_none() || pc.color() != us {
                return false;
            }

            // 移動先に自分の駒がないか。玉を取る手も形として不正。
            let to_pc = self.piece_on(to);
            if to_pc.is_some() && (to_pc.color() == us || to_pc.piece_type() == PieceType::King) {
                return false;
            }

            let pt = pc.piece_type();
            if m.is_promote() {
                // 成れる駒か、成れる移動か
                if !pt.can_promote() {
                    return false;
                }
                if !from.rank().is_promotion_zone(us) && !to.rank().is_promotion_zone(us) {
                    return false;
                }
            } else {
                // 行き所のない駒になる不成は指せない
                if !drop_rank_ok(us, pt, to) {
                    return false;
                }
            }

            // 駒の利きとして到達できるか
            piece_effect(pc, from, self.occupied()).contains(to)
        }
    }

    /// 指し手が完全に合法か（pseudo-legalであることが前提）
    ///
    /// 歩の不成などの形の検査はpseudo_legal()側の仕事。ここでは
    /// 1) pinされた駒の素抜き 2) 玉の危険地帯への移動 3) 王手の放置
    /// 4) 打ち歩詰め を弾く。
    pub fn legal(&self, m: Move) -> bool {
        debug_assert!(self.pseudo_legal(m));

        let us = self.side_to_move();
        let them = !us;
        let ksq = self.king_square(us);
        let to = m.to();

        if m.is_drop() {
            // 王手がかかっているなら合駒になっていなければならない
            if self.in_check() {
                let checkers = self.checkers();
                if checkers.more_than_one() {
                    return false;
                }
                let csq = checkers.lsb().unwrap();
                if !between_bb(ksq, csq).contains(to) {
                    return false;
                }
            }

            // 打ち歩詰め
            if m.drop_piece_type() == PieceType::Pawn
                && pawn_effect(us, to).contains(self.king_square(them))
                && !self.legal_drop(to)
            {
                return false;
            }

            return true;
        }

        let from = m.from();
        let pc = self.piece_on(from);

        if pc.piece_type() == PieceType::King {
            // 相手の利きがある升へは動けない。玉自身が遮っていた利きも含めて判定。
            return !self.effected_to_ex_king(them, to, ksq);
        }

        // 王手の放置チェック（玉以外の手は、唯一の王手駒を取るか合駒するか）
        if self.in_check() {
            let checkers = self.checkers();
            if checkers.more_than_one() {
                return false;
            }
            let csq = checkers.lsb().unwrap();
            if to != csq && !between_bb(ksq, csq).contains(to) {
                return false;
            }
        }

        // pinされた駒は玉との直線上でしか動けない
        if self.blockers_for_king(us).contains(from) && !aligned(ksq, from, to) {
            return false;
        }

        true
    }

    /// toに歩を打つ手が打ち歩詰めにならないならtrue
    ///
    /// 歩がtoに打て（二歩でなく）、toの先に敵玉がいることまでは呼び出し側が
    /// 確認していることが前提。王手された玉の側に可能な応手が1つでもあれば
    /// 打ち歩詰めではない。
    pub fn legal_drop(&self, to: Square) -> bool {
        let us = self.side_to_move();
        let them = !us;
        let ksq = self.king_square(them);
        debug_assert!(pawn_effect(us, to).contains(ksq));

        // 1) 玉以外の駒で打たれた歩を取れるか。
        //    pinされている駒でも、pinの直線上の升を取るのであれば合法。
        let defenders =
            self.attackers_to_pawn(them, to) & !Bitboard::from_square(ksq);
        for dsq in defenders.iter() {
            if !self.blockers_for_king(them).contains(dsq)
                || aligned(ksq, dsq, to)
            {
                return true;
            }
        }

        // 2) 玉が逃げられるか（打たれた歩を玉で取る手を含む）。
        //    歩を盤に置き、玉を占有から外した状態で利きを判定する。
        let occ = (self.occupied() | Bitboard::from_square(to)) ^ Bitboard::from_square(ksq);
        let escapes = king_effect(ksq) & !self.pieces_c(them);
        for esq in escapes.iter() {
            if (self.attackers_to_c_occ(us, esq, occ) & occ).is_empty() {
                return true;
            }
        }

        // 取れず逃げられず。打ち歩詰め。
        false
    }

    /// 二歩でなく、かつ打ち歩詰めでもない歩打ちならtrue
    pub fn legal_pawn_drop(&self, us: Color, to: Square) -> bool {
        if (self.pieces(us, PieceType::Pawn) & FILE_BB[to.file().index()]).is_not_empty() {
            return false;
        }
        if pawn_effect(us, to).contains(self.king_square(!us)) {
            return self.legal_drop(to);
        }
        true
    }
}

/// 行き所のない駒にならない段か（打ち・不成の移動先の検査）
fn drop_rank_ok(us: Color, pt: PieceType, to: Square) -> bool {
    let rel = match us {
        Color::Black => to.rank().index(),
        Color::White => 8 - to.rank().index(),
    };
    match pt {
        PieceType::Pawn | PieceType::Lance => rel >= 1,
        PieceType::Knight => rel >= 2,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{File, Rank};

    fn sq(f: File, r: Rank) -> Square {
        Square::new(f, r)
    }

    fn usi(pos: &Position, s: &str) -> Move {
        pos.move_from_usi(s).unwrap()
    }

    #[test]
    fn test_pseudo_legal_basic() {
        let mut pos = Position::new();
        pos.set_hirate();

        // 7六歩は形として妥当
        assert!(pos.pseudo_legal(usi(&pos, "7g7f")));

        // 歩は2マス進めない
        let m = Move::new_move(sq(File::File7, Rank::Rank7), sq(File::File7, Rank::Rank5), false);
        assert!(!pos.pseudo_legal(m));

        // 空マスからは動けない
        let m = Move::new_move(Square::SQ_55, sq(File::File5, Rank::Rank4), false);
        assert!(!pos.pseudo_legal(m));

        // 自分の駒の上には行けない（3九銀→4八は金がいる...いない。2八飛の升へ銀）
        let m = Move::new_move(sq(File::File3, Rank::Rank9), sq(File::File2, Rank::Rank8), false);
        assert!(!pos.pseudo_legal(m));

        // 特殊な指し手は常にfalse
        assert!(!pos.pseudo_legal(Move::NONE));
        assert!(!pos.pseudo_legal(Move::NULL));
        assert!(!pos.pseudo_legal(Move::WIN));
    }

    #[test]
    fn test_pseudo_legal_promotion_zone() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/7P1/9/9/9/9/9/4K4 b - 1").unwrap();

        // 2三歩は2二で成れる
        let m = Move::new_move(sq(File::File2, Rank::Rank3), sq(File::File2, Rank::Rank2), true);
        assert!(pos.pseudo_legal(m));

        // 敵陣に関係しない成りは形として不正
        pos.set_sfen("4k4/9/9/9/4P4/9/9/9/4K4 b - 1").unwrap();
        let m = Move::new_move(Square::SQ_55, sq(File::File5, Rank::Rank4), true);
        assert!(!pos.pseudo_legal(m));

        // 金は成れない
        pos.set_sfen("4k4/1G7/9/9/9/9/9/9/4K4 b - 1").unwrap();
        let m = Move::new_move(sq(File::File2, Rank::Rank2), sq(File::File2, Rank::Rank1), true);
        assert!(!pos.pseudo_legal(m));
    }

    #[test]
    fn test_pseudo_legal_dead_end_moves() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/7P1/9/9/9/9/9/9/4K4 b - 1").unwrap();

        // 2二歩の1段目への不成は不可、成りは可
        let m = Move::new_move(sq(File::File2, Rank::Rank2), sq(File::File2, Rank::Rank1), false);
        assert!(!pos.pseudo_legal(m));
        let m = Move::new_move(sq(File::File2, Rank::Rank2), sq(File::File2, Rank::Rank1), true);
        assert!(pos.pseudo_legal(m));
    }

    #[test]
    fn test_pseudo_legal_drops() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/9/9/9/9/4K4 b PLN 1").unwrap();

        // 通常の打ち
        assert!(pos.pseudo_legal(Move::new_drop(PieceType::Pawn, Square::SQ_55)));

        // 手駒にない駒は打てない
        assert!(!pos.pseudo_legal(Move::new_drop(PieceType::Gold, Square::SQ_55)));

        // 行き所のない打ち
        assert!(!pos.pseudo_legal(Move::new_drop(PieceType::Pawn, sq(File::File2, Rank::Rank1))));
        assert!(!pos.pseudo_legal(Move::new_drop(PieceType::Lance, sq(File::File2, Rank::Rank1))));
        assert!(!pos.pseudo_legal(Move::new_drop(PieceType::Knight, sq(File::File2, Rank::Rank2))));
        assert!(pos.pseudo_legal(Move::new_drop(PieceType::Knight, sq(File::File2, Rank::Rank3))));

        // 駒のある升には打てない
        assert!(!pos.pseudo_legal(Move::new_drop(PieceType::Pawn, sq(File::File5, Rank::Rank1))));
    }

    #[test]
    fn test_pseudo_legal_nifu() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/9/9/4P4/9/4K4 b P 1").unwrap();

        // 5筋には歩がいるので二歩
        assert!(!pos.pseudo_legal(Move::new_drop(PieceType::Pawn, Square::SQ_55)));
        // 4筋はよい
        assert!(pos.pseudo_legal(Move::new_drop(PieceType::Pawn, sq(File::File4, Rank::Rank5))));
    }

    #[test]
    fn test_legal_pinned_piece() {
        // 5九玉、5五銀、5一飛のpin局面
        let mut pos = Position::new();
        pos.set_sfen("4r4/9/9/9/4S4/9/9/9/4K4 b - 1").unwrap();

        // pin直線上の移動（5四へ）は合法
        let m = Move::new_move(Square::SQ_55, sq(File::File5, Rank::Rank4), false);
        assert!(pos.pseudo_legal(m) && pos.legal(m));

        // 直線から外れる移動（4四へ）は非合法
        let m = Move::new_move(Square::SQ_55, sq(File::File4, Rank::Rank4), false);
        assert!(pos.pseudo_legal(m));
        assert!(!pos.legal(m));
    }

    #[test]
    fn test_legal_king_into_attack() {
        // 5一飛に対して玉が5筋の隣の筋から5筋に入るのは非合法
        let mut pos = Position::new();
        pos.set_sfen("4r4/9/9/9/9/9/9/9/3K5 b - 1").unwrap();

        // 6九玉→5九は飛の利き（玉を除外した判定）
        let m = Move::new_move(sq(File::File6, Rank::Rank9), sq(File::File5, Rank::Rank9), false);
        assert!(pos.pseudo_legal(m));
        assert!(!pos.legal(m));

        // 6九玉→7九は安全
        let m = Move::new_move(sq(File::File6, Rank::Rank9), sq(File::File7, Rank::Rank9), false);
        assert!(pos.legal(m));
    }

    #[test]
    fn test_legal_king_cannot_retreat_along_ray() {
        // 玉が遠方駒の利きの直線上を後退しても利きからは逃れられない
        let mut pos = Position::new();
        pos.set_sfen("4r4/9/9/9/4K4/9/9/9/9 b - 1").unwrap();
        assert!(pos.in_check());

        // 5五玉→5六（飛の直線上のまま）は非合法
        let m = Move::new_move(Square::SQ_55, sq(File::File5, Rank::Rank6), false);
        assert!(!pos.legal(m));

        // 5五玉→4五は合法
        let m = Move::new_move(Square::SQ_55, sq(File::File4, Rank::Rank5), false);
        assert!(pos.legal(m));
    }

    #[test]
    fn test_legal_check_evasion() {
        // 5一飛が5九玉に王手。金の合駒と無関係な手の区別。
        let mut pos = Position::new();
        pos.set_sfen("4r4/9/9/9/9/9/9/1G7/4K4 b - 1").unwrap();
        assert!(pos.in_check());

        // 8八金→7八は王手放置で非合法（王手と無関係）
        let m = Move::new_move(sq(File::File8, Rank::Rank8), sq(File::File7, Rank::Rank8), false);
        assert!(pos.pseudo_legal(m));
        assert!(!pos.legal(m));

        // 玉が横に逃げるのは合法
        let m = Move::new_move(Square::SQ_59, sq(File::File4, Rank::Rank9), false);
        assert!(pos.legal(m));
    }

    #[test]
    fn test_legal_drop_interpose() {
        // 王手中の駒打ちは合駒のみ
        let mut pos = Position::new();
        pos.set_sfen("4r4/9/9/9/9/9/9/9/4K4 b G 1").unwrap();
        assert!(pos.in_check());

        // 5五金打（飛と玉の間）は合法
        let m = Move::new_drop(PieceType::Gold, Square::SQ_55);
        assert!(pos.legal(m));

        // 4四金打は王手放置
        let m = Move::new_drop(PieceType::Gold, sq(File::File4, Rank::Rank4));
        assert!(pos.pseudo_legal(m));
        assert!(!pos.legal(m));
    }

    #[test]
    fn test_legal_double_check_requires_king_move() {
        // 両王手: 5五の馬(5一へのライン)と5九の飛... 構図を単純化して
        // 5九玉に対して5一飛と1五角の両王手
        let mut pos = Position::new();
        pos.set_sfen("4r4/9/9/9/8b/9/9/1G7/4K4 b G 1").unwrap();
        assert_eq!(pos.checkers().count(), 2);

        // 合駒は無効
        let m = Move::new_drop(PieceType::Gold, Square::SQ_55);
        assert!(!pos.legal(m));
        let m = Move::new_move(sq(File::File8, Rank::Rank8), sq(File::File7, Rank::Rank8), false);
        assert!(!pos.legal(m));

        // 玉の移動のみ（4九は角筋なので5八...5八は飛筋。6九へ）
        let m = Move::new_move(Square::SQ_59, sq(File::File6, Rank::Rank9), false);
        assert!(pos.legal(m));
    }

    #[test]
    fn test_pawn_drop_mate_illegal() {
        // 1一玉、2一に後手香（退路塞ぎ）、2三に先手銀（1二と2二をカバー）
        // 1二歩打は打ち歩詰めで非合法
        let mut pos = Position::new();
        pos.set_sfen("7lk/9/7S1/9/9/9/9/9/4K4 b P 1").unwrap();

        let to = sq(File::File1, Rank::Rank2);
        let m = Move::new_drop(PieceType::Pawn, to);
        assert!(pos.pseudo_legal(m));
        assert!(!pos.legal_drop(to));
        assert!(!pos.legal(m));
        assert!(!pos.legal_pawn_drop(Color::Black, to));
    }

    #[test]
    fn test_pawn_drop_check_not_mate_is_legal() {
        // 銀の支えがなければ玉が歩を取れるので合法
        let mut pos = Position::new();
        pos.set_sfen("7lk/9/9/9/9/9/9/9/4K4 b P 1").unwrap();

        let to = sq(File::File1, Rank::Rank2);
        let m = Move::new_drop(PieceType::Pawn, to);
        assert!(pos.legal_drop(to));
        assert!(pos.legal(m));
    }

    #[test]
    fn test_pawn_drop_mate_defender_capture() {
        // 支えのある歩でも、受け方に取れる駒があれば打ち歩詰めではない
        // 2二に後手金を足す: 金で1二の歩を取れる
        let mut pos = Position::new();
        pos.set_sfen("7lk/7g1/7S1/9/9/9/9/9/4K4 b P 1").unwrap();

        let to = sq(File::File1, Rank::Rank2);
        assert!(pos.legal_drop(to));
    }

    #[test]
    fn test_pawn_drop_mate_pinned_defender() {
        // 取れる駒がpinされていて、取ると素抜きになる場合は取れない扱い
        // 1一玉、1二へ歩打ち。2二後手金は2三の銀で支えられた歩を取りたいが、
        // 3三の先手角が2二の金をpinしている（1一玉との直線）。
        let mut pos = Position::new();
        pos.set_sfen("7lk/7g1/6BS1/9/9/9/9/9/4K4 b P 1").unwrap();

        let to = sq(File::File1, Rank::Rank2);
        // 金は1二の歩を取れない（pin直線外）ので打ち歩詰め
        assert!(!pos.legal_drop(to));
    }

    #[test]
    fn test_legal_pawn_drop_nifu() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/9/9/4P4/9/4K4 b P 1").unwrap();
        assert!(!pos.legal_pawn_drop(Color::Black, Square::SQ_55));
        assert!(pos.legal_pawn_drop(Color::Black, sq(File::File4, Rank::Rank5)));
    }
}
