//! 局面（Position）
//!
//! 盤面配列・Bitboard・手駒・手番と、1手ごとのStateInfoスタックを持つ。
//! do_move/undo_moveは厳密なLIFOで呼ぶこと。undo_moveにはdo_moveと同じ指し手を
//! 逆順に渡す。それ以外の呼び方は未定義（debugビルドでのみassertされる）。
//!
//! Positionは複製できない。生きた局面の複製はStateInfoスタックの深い複製を
//! 要求するため、設計として禁止している。

use crate::bitboard::{
    bishop_effect, dragon_effect, gold_effect, horse_effect, king_effect, knight_effect,
    lance_effect, pawn_effect, rook_effect, silver_effect, aligned, between_bb, Bitboard,
};
use crate::types::{Color, Hand, Move, Move16, Piece, PieceType, RepetitionState, Square};

use super::entering_king::EnteringKingRule;
use super::state::{ChangedPiece, HandChange, StateInfo};
use super::zobrist::{zobrist_hand, zobrist_psq, zobrist_side};

/// StateInfoスタックの初期確保量。探索がこれより深くならない限り
/// do_moveでの再確保は起きない。
const STATE_STACK_RESERVE: usize = 640;

/// 千日手判定で遡る手数のデフォルト
pub const DEFAULT_MAX_REPETITION_PLY: i32 = 16;

/// 将棋の局面
pub struct Position {
    // === 盤面 ===
    /// 各マスの駒 [Square]
    pub(super) board: [Piece; Square::NUM],
    /// 駒種別Bitboard [PieceType]
    pub(super) by_type: [Bitboard; PieceType::NUM + 1],
    /// 先後別Bitboard
    pub(super) by_color: [Bitboard; Color::NUM],

    // === 手駒 ===
    /// 手駒 [Color]
    pub(super) hands: [Hand; Color::NUM],

    // === 状態 ===
    /// StateInfoスタック（末尾が現局面）
    pub(super) states: Vec<StateInfo>,
    /// 初期局面からの手数
    pub(super) game_ply: i32,
    /// 手番
    pub(super) side_to_move: Color,
    /// 玉の位置 [Color]
    pub(super) king_square: [Square; Color::NUM],

    // === ルール設定 ===
    /// 千日手判定で遡る最大手数
    pub(super) max_repetition_ply: i32,
    /// 入玉宣言ルール
    pub(super) entering_king_rule: EnteringKingRule,
}

impl Position {
    // ========== 局面設定 ==========

    /// 空の局面を生成
    pub fn new() -> Self {
        let mut states = Vec::with_capacity(STATE_STACK_RESERVE);
        states.push(StateInfo::new());
        Position {
            board: [Piece::NONE; Square::NUM],
            by_type: [Bitboard::EMPTY; PieceType::NUM + 1],
            by_color: [Bitboard::EMPTY; Color::NUM],
            hands: [Hand::EMPTY; Color::NUM],
            states,
            game_ply: 1,
            side_to_move: Color::Black,
            king_square: [Square::SQ_11; Color::NUM],
            max_repetition_ply: DEFAULT_MAX_REPETITION_PLY,
            entering_king_rule: EnteringKingRule::None,
        }
    }

    /// 千日手判定で遡る最大手数を設定
    ///
    /// チェーンの実深さより大きな値はその場で切り詰められるので、
    /// どんな値を与えてもエラーにはならない。
    pub fn set_max_repetition_ply(&mut self, ply: i32) {
        self.max_repetition_ply = ply.max(0);
    }

    /// 入玉宣言ルールを設定
    pub fn set_entering_king_rule(&mut self, rule: EnteringKingRule) {
        self.entering_king_rule = rule;
    }

    // ========== 盤面アクセス ==========

    /// 指定マスの駒を取得
    #[inline]
    pub fn piece_on(&self, sq: Square) -> Piece {
        self.board[sq.index()]
    }

    /// 全駒のBitboard（占有）
    #[inline]
    pub fn occupied(&self) -> Bitboard {
        self.by_color[Color::Black.index()] | self.by_color[Color::White.index()]
    }

    /// 駒がない升のBitboard
    #[inline]
    pub fn empties(&self) -> Bitboard {
        !self.occupied()
    }

    /// 指定駒種のBitboard（両手番）
    #[inline]
    pub fn pieces_pt(&self, pt: PieceType) -> Bitboard {
        self.by_type[pt as usize]
    }

    /// 指定手番の駒のBitboard
    #[inline]
    pub fn pieces_c(&self, c: Color) -> Bitboard {
        self.by_color[c.index()]
    }

    /// 指定手番・駒種のBitboard
    #[inline]
    pub fn pieces(&self, c: Color, pt: PieceType) -> Bitboard {
        self.by_color[c.index()] & self.by_type[pt as usize]
    }

    /// 金の動きをする駒（金＋成駒、龍馬を除く）のBitboard
    #[inline]
    pub fn gold_movers(&self, c: Color) -> Bitboard {
        (self.pieces_pt(PieceType::Gold)
            | self.pieces_pt(PieceType::ProPawn)
            | self.pieces_pt(PieceType::ProLance)
            | self.pieces_pt(PieceType::ProKnight)
            | self.pieces_pt(PieceType::ProSilver))
            & self.pieces_c(c)
    }

    /// 手駒を取得
    #[inline]
    pub fn hand(&self, c: Color) -> Hand {
        self.hands[c.index()]
    }

    /// 玉の位置を取得
    #[inline]
    pub fn king_square(&self, c: Color) -> Square {
        self.king_square[c.index()]
    }

    /// 手番を取得
    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    /// 手数を取得
    #[inline]
    pub fn game_ply(&self) -> i32 {
        self.game_ply
    }

    /// 現在のStateInfoを取得
    #[inline]
    pub fn state(&self) -> &StateInfo {
        debug_assert!(!self.states.is_empty());
        self.states.last().unwrap()
    }

    #[inline]
    pub(super) fn state_mut(&mut self) -> &mut StateInfo {
        debug_assert!(!self.states.is_empty());
        self.states.last_mut().unwrap()
    }

    /// 局面のハッシュキー
    #[inline]
    pub fn key(&self) -> u64 {
        self.state().key()
    }

    /// 盤面成分のハッシュキー
    #[inline]
    pub fn board_key(&self) -> u64 {
        self.state().board_key
    }

    /// 手駒成分のハッシュキー
    #[inline]
    pub fn hand_key(&self) -> u64 {
        self.state().hand_key
    }

    /// 直前の指し手で捕獲された駒
    #[inline]
    pub fn captured_piece(&self) -> Piece {
        self.state().captured_piece
    }

    /// 直前の指し手
    #[inline]
    pub fn last_move(&self) -> Move {
        self.state().last_move
    }

    // ========== 利き計算 ==========

    /// 指定マスに利いている駒（全手番、現在の占有）
    pub fn attackers_to(&self, sq: Square) -> Bitboard {
        self.attackers_to_occ(sq, self.occupied())
    }

    /// 指定マスに利いている駒（全手番、占有指定）
    ///
    /// occupiedを差し替えることで「この升の駒をどけたら」の問い合わせができる
    /// （SEEなどで使う）。
    pub fn attackers_to_occ(&self, sq: Square, occupied: Bitboard) -> Bitboard {
        self.attackers_to_c_occ(Color::Black, sq, occupied)
            | self.attackers_to_c_occ(Color::White, sq, occupied)
    }

    /// 指定マスに利いている指定手番の駒（現在の占有）
    #[inline]
    pub fn attackers_to_c(&self, c: Color, sq: Square) -> Bitboard {
        self.attackers_to_c_occ(c, sq, self.occupied())
    }

    /// 指定マスに利いている指定手番の駒（占有指定）
    ///
    /// 各駒種について、sqから逆向きの利きを求めて実際の駒位置と交差させる。
    /// 例: sqにc側の歩が利く ⟺ sqから敵向きの歩の利き先にc側の歩がある。
    pub fn attackers_to_c_occ(&self, c: Color, sq: Square, occupied: Bitboard) -> Bitboard {
        let them = !c;

        let pawns = pawn_effect(them, sq) & self.pieces(c, PieceType::Pawn);
        let knights = knight_effect(them, sq) & self.pieces(c, PieceType::Knight);
        let silvers = silver_effect(them, sq) & self.pieces(c, PieceType::Silver);
        let golds = gold_effect(them, sq) & self.gold_movers(c);
        let lances = lance_effect(them, sq, occupied) & self.pieces(c, PieceType::Lance);
        let bishops = bishop_effect(sq, occupied)
            & (self.pieces(c, PieceType::Bishop) | self.pieces(c, PieceType::Horse));
        let rooks = rook_effect(sq, occupied)
            & (self.pieces(c, PieceType::Rook) | self.pieces(c, PieceType::Dragon));
        // 馬・龍の近接成分と玉
        let ring = king_effect(sq)
            & (self.pieces(c, PieceType::Horse)
                | self.pieces(c, PieceType::Dragon)
                | self.pieces(c, PieceType::King));

        pawns | knights | silvers | golds | lances | bishops | rooks | ring
    }

    /// 打ち歩詰め判定用: 歩を打った升pawn_sqに利いているc側の駒
    ///
    /// pawn_sqはc側の玉の目の前なので、c側の香が後ろから利くことはありえない。
    /// 香の逆引きを省いた分だけ軽い。
    pub fn attackers_to_pawn(&self, c: Color, pawn_sq: Square) -> Bitboard {
        let them = !c;
        let occupied = self.occupied();

        let pawns = pawn_effect(them, pawn_sq) & self.pieces(c, PieceType::Pawn);
        let knights = knight_effect(them, pawn_sq) & self.pieces(c, PieceType::Knight);
        let silvers = silver_effect(them, pawn_sq) & self.pieces(c, PieceType::Silver);
        let golds = gold_effect(them, pawn_sq) & self.gold_movers(c);
        let bishops = bishop_effect(pawn_sq, occupied)
            & (self.pieces(c, PieceType::Bishop) | self.pieces(c, PieceType::Horse));
        let rooks = rook_effect(pawn_sq, occupied)
            & (self.pieces(c, PieceType::Rook) | self.pieces(c, PieceType::Dragon));
        let ring = king_effect(pawn_sq)
            & (self.pieces(c, PieceType::Horse)
                | self.pieces(c, PieceType::Dragon)
                | self.pieces(c, PieceType::King));

        pawns | knights | silvers | golds | bishops | rooks | ring
    }

    /// c側の利きがsqにあるか
    #[inline]
    pub fn effected_to(&self, c: Color, sq: Square) -> bool {
        self.attackers_to_c(c, sq).is_not_empty()
    }

    /// c側の利きがsqにあるか（king_sqの玉を占有から除外して判定）
    ///
    /// 玉の移動先の安全判定に使う。玉自身が遠方駒の利きを遮っている升へは
    /// 逃げられない。
    #[inline]
    pub fn effected_to_ex_king(&self, c: Color, sq: Square, king_sq: Square) -> bool {
        let occ = self.occupied() ^ Bitboard::from_square(king_sq);
        (self.attackers_to_c_occ(c, sq, occ) & occ).is_not_empty()
    }

    /// 自玉へのピン駒（c側の玉に対するblocker、双方の駒を含む）
    #[inline]
    pub fn blockers_for_king(&self, c: Color) -> Bitboard {
        self.state().blockers_for_king[c.index()]
    }

    /// c側の玉をpinしている敵の遠方駒
    #[inline]
    pub fn pinners(&self, c: Color) -> Bitboard {
        self.state().pinners[c.index()]
    }

    /// c側のpinされている駒（c側の駒のみ）
    #[inline]
    pub fn pinned_pieces(&self, c: Color) -> Bitboard {
        self.state().blockers_for_king[c.index()] & self.pieces_c(c)
    }

    /// 王手している駒
    #[inline]
    pub fn checkers(&self) -> Bitboard {
        self.state().checkers
    }

    /// 王手されているか
    #[inline]
    pub fn in_check(&self) -> bool {
        !self.state().checkers.is_empty()
    }

    /// 指定駒種をそこに動かすと敵玉に王手となる升
    #[inline]
    pub fn check_squares(&self, pt: PieceType) -> Bitboard {
        self.state().check_squares[pt as usize]
    }

    // ========== 内部操作 ==========

    /// 盤面に駒を置く
    pub(super) fn put_piece(&mut self, pc: Piece, sq: Square) {
        debug_assert!(self.board[sq.index()].is_none());
        self.board[sq.index()] = pc;
        self.by_type[pc.piece_type() as usize].toggle(sq);
        self.by_color[pc.color().index()].toggle(sq);
    }

    /// 盤面から駒を取り除く
    pub(super) fn remove_piece(&mut self, sq: Square) {
        let pc = self.board[sq.index()];
        debug_assert!(pc.is_some());
        self.board[sq.index()] = Piece::NONE;
        self.by_type[pc.piece_type() as usize].toggle(sq);
        self.by_color[pc.color().index()].toggle(sq);
    }

    /// pin駒とpinしている駒を更新（両玉ぶん）
    pub(super) fn update_blockers_and_pinners(&mut self) {
        let occupied = self.occupied();
        for c in Color::ALL {
            let ksq = self.king_square[c.index()];
            let them = !c;

            // 空の盤面と仮定したときに玉へ届く敵の遠方駒
            let snipers = (lance_effect(c, ksq, Bitboard::EMPTY)
                & self.pieces(them, PieceType::Lance))
                | (bishop_effect(ksq, Bitboard::EMPTY)
                    & (self.pieces(them, PieceType::Bishop) | self.pieces(them, PieceType::Horse)))
                | (rook_effect(ksq, Bitboard::EMPTY)
                    & (self.pieces(them, PieceType::Rook) | self.pieces(them, PieceType::Dragon)));

            let mut blockers = Bitboard::EMPTY;
            let mut pinners = Bitboard::EMPTY;
            for sniper_sq in snipers.iter() {
                let between = between_bb(ksq, sniper_sq) & occupied;
                // 間にちょうど1枚だけあるとき、それがblocker
                if !between.is_empty() && !between.more_than_one() {
                    blockers |= between;
                    // blockerが玉側の駒なら、sniperはpinner
                    if (between & self.pieces_c(c)).is_not_empty() {
                        pinners.set(sniper_sq);
                    }
                }
            }
            let st = self.state_mut();
            st.blockers_for_king[c.index()] = blockers;
            st.pinners[c.index()] = pinners;
        }
    }

    /// 王手となる升を更新（手番側が敵玉に王手できる升）
    pub(super) fn update_check_squares(&mut self) {
        let them = !self.side_to_move;
        let ksq = self.king_square[them.index()];
        let occupied = self.occupied();

        let pawn = pawn_effect(them, ksq);
        let knight = knight_effect(them, ksq);
        let silver = silver_effect(them, ksq);
        let gold = gold_effect(them, ksq);
        let lance = lance_effect(them, ksq, occupied);
        let bishop = bishop_effect(ksq, occupied);
        let rook = rook_effect(ksq, occupied);
        let horse = horse_effect(ksq, occupied);
        let dragon = dragon_effect(ksq, occupied);

        let cs = &mut self.state_mut().check_squares;
        cs[PieceType::Pawn as usize] = pawn;
        cs[PieceType::Lance as usize] = lance;
        cs[PieceType::Knight as usize] = knight;
        cs[PieceType::Silver as usize] = silver;
        cs[PieceType::Bishop as usize] = bishop;
        cs[PieceType::Rook as usize] = rook;
        cs[PieceType::Gold as usize] = gold;
        cs[PieceType::King as usize] = Bitboard::EMPTY; // 玉で王手はできない
        cs[PieceType::ProPawn as usize] = gold;
        cs[PieceType::ProLance as usize] = gold;
        cs[PieceType::ProKnight as usize] = gold;
        cs[PieceType::ProSilver as usize] = gold;
        cs[PieceType::Horse as usize] = horse;
        cs[PieceType::Dragon as usize] = dragon;
    }

    // ========== 指し手実行 ==========

    /// 指し手を実行
    ///
    /// mは少なくともpseudo-legalであることが呼び出し側の責任。
    /// gives_checkにはこの指し手が王手になるかを渡す（`gives_check()`で計算できる）。
    pub fn do_move(&mut self, m: Move, gives_check: bool) {
        debug_assert!(m.is_ok());

        let us = self.side_to_move;
        let them = !us;

        let prev_idx = (self.states.len() - 1) as u32;
        let mut st = self.state().partial_clone();
        st.previous = Some(prev_idx);
        st.plies_from_null += 1;
        st.last_move = m;

        // 手番のハッシュ更新
        st.board_key ^= zobrist_side();
        self.game_ply += 1;

        if m.is_drop() {
            let pt = m.drop_piece_type();
            let to = m.to();
            let pc = Piece::new(us, pt);
            debug_assert!(self.hands[us.index()].has(pt));
            debug_assert!(self.piece_on(to).is_none());

            let old_count = self.hands[us.index()].count(pt) as u8;
            self.hands[us.index()] = self.hands[us.index()].sub(pt);
            st.hand_key = st.hand_key.wrapping_sub(zobrist_hand(us, pt));
            st.dirty_piece.set_hand_change(HandChange {
                owner: us,
                piece_type: pt,
                old_count,
                new_count: old_count - 1,
            });

            self.put_piece(pc, to);
            st.board_key ^= zobrist_psq(pc, to);
            st.dirty_piece.push_piece(ChangedPiece {
                old_piece: Piece::NONE,
                old_sq: None,
                new_piece: pc,
                new_sq: Some(to),
            });

            st.captured_piece = Piece::NONE;
        } else {
            let from = m.from();
            let to = m.to();
            let pc = self.piece_on(from);
            let captured = self.piece_on(to);
            debug_assert!(pc.is_some() && pc.color() == us);
            // 玉が取られる指し手は合法性検査をすり抜けた非合法手
            debug_assert!(
                captured.is_none()
                    || (captured.color() == them && captured.piece_type() != PieceType::King)
            );

            if captured.is_some() {
                let captured_pt = captured.piece_type().unpromote();
                self.remove_piece(to);
                st.board_key ^= zobrist_psq(captured, to);

                // 成駒は生駒に戻して手駒へ
                let old_count = self.hands[us.index()].count(captured_pt) as u8;
                self.hands[us.index()] = self.hands[us.index()].add(captured_pt);
                st.hand_key = st.hand_key.wrapping_add(zobrist_hand(us, captured_pt));
                st.dirty_piece.set_hand_change(HandChange {
                    owner: us,
                    piece_type: captured_pt,
                    old_count,
                    new_count: old_count + 1,
                });
            }
            st.captured_piece = captured;

            self.remove_piece(from);
            st.board_key ^= zobrist_psq(pc, from);

            let moved_pc = if m.is_promote() {
                debug_assert!(pc.piece_type().can_promote());
                pc.promote().unwrap()
            } else {
                pc
            };
            self.put_piece(moved_pc, to);
            st.board_key ^= zobrist_psq(moved_pc, to);

            st.dirty_piece.push_piece(ChangedPiece {
                old_piece: pc,
                old_sq: Some(from),
                new_piece: moved_pc,
                new_sq: Some(to),
            });
            if captured.is_some() {
                st.dirty_piece.push_piece(ChangedPiece {
                    old_piece: captured,
                    old_sq: Some(to),
                    new_piece: Piece::NONE,
                    new_sq: None,
                });
            }

            if pc.piece_type() == PieceType::King {
                self.king_square[us.index()] = to;
                st.dirty_piece.king_moved[us.index()] = true;
            }
        }

        // 手番交代
        self.side_to_move = them;

        // 王手情報。gives_checkを信頼し、王手でなければ空のまま。
        st.checkers = if gives_check {
            self.attackers_to_c(us, self.king_square[them.index()])
        } else {
            Bitboard::EMPTY
        };
        debug_assert!(
            gives_check
                == self
                    .attackers_to_c(us, self.king_square[them.index()])
                    .is_not_empty()
        );

        // 連続王手カウンタ（手数単位、自分の1手で+2）
        st.continuous_check[us.index()] = if gives_check {
            st.continuous_check[us.index()] + 2
        } else {
            0
        };

        // 新しい手番側の手駒スナップショット（千日手判定用）
        st.hand = self.hands[them.index()];

        self.states.push(st);

        self.update_blockers_and_pinners();
        self.update_check_squares();
        self.classify_repetition();
    }

    /// 指し手を戻す
    ///
    /// mはこのレコードを作ったdo_moveと同じ指し手でなければならない。
    pub fn undo_move(&mut self, m: Move) {
        debug_assert!(self.states.len() >= 2);
        debug_assert!(self.state().last_move == m);

        // 手番を戻す
        self.side_to_move = !self.side_to_move;
        self.game_ply -= 1;
        let us = self.side_to_move;

        if m.is_drop() {
            let pt = m.drop_piece_type();
            let to = m.to();

            self.remove_piece(to);
            self.hands[us.index()] = self.hands[us.index()].add(pt);
        } else {
            let from = m.from();
            let to = m.to();
            let moved_pc = self.piece_on(to);
            let original_pc = if m.is_promote() {
                moved_pc.unpromote()
            } else {
                moved_pc
            };

            self.remove_piece(to);
            self.put_piece(original_pc, from);

            if original_pc.piece_type() == PieceType::King {
                self.king_square[us.index()] = from;
            }

            let captured = self.state().captured_piece;
            if captured.is_some() {
                self.put_piece(captured, to);
                self.hands[us.index()] =
                    self.hands[us.index()].sub(captured.piece_type().unpromote());
            }
        }

        // 派生情報はレコードを捨てるだけで巻き戻る
        self.states.pop();
    }

    /// null move（パス）を実行
    ///
    /// 王手されている局面で呼んではならない。
    pub fn do_null_move(&mut self) {
        debug_assert!(!self.in_check());

        let prev_idx = (self.states.len() - 1) as u32;
        let mut st = self.state().partial_clone();
        st.previous = Some(prev_idx);
        st.last_move = Move::NULL;
        // null moveを跨いだ千日手の遡りはしない
        st.plies_from_null = 0;

        st.board_key ^= zobrist_side();
        self.side_to_move = !self.side_to_move;

        st.checkers = Bitboard::EMPTY;
        st.continuous_check[(!self.side_to_move).index()] = 0;
        st.hand = self.hands[self.side_to_move.index()];

        self.states.push(st);

        self.update_blockers_and_pinners();
        self.update_check_squares();
    }

    /// null moveを戻す
    pub fn undo_null_move(&mut self) {
        debug_assert!(self.states.len() >= 2);
        debug_assert!(self.state().last_move.is_null());
        self.side_to_move = !self.side_to_move;
        self.states.pop();
    }

    /// ある指し手を指した後のハッシュキーを、指さずに計算する
    ///
    /// 置換表の投機的prefetch用。
    pub fn key_after(&self, m: Move) -> u64 {
        let us = self.side_to_move;
        let st = self.state();
        let mut board_key = st.board_key ^ zobrist_side();
        let mut hand_key = st.hand_key;

        if m.is_drop() {
            let pt = m.drop_piece_type();
            board_key ^= zobrist_psq(Piece::new(us, pt), m.to());
            hand_key = hand_key.wrapping_sub(zobrist_hand(us, pt));
        } else {
            let from = m.from();
            let to = m.to();
            let pc = self.piece_on(from);
            let captured = self.piece_on(to);

            if captured.is_some() {
                board_key ^= zobrist_psq(captured, to);
                hand_key =
                    hand_key.wrapping_add(zobrist_hand(us, captured.piece_type().unpromote()));
            }
            let moved_pc = if m.is_promote() {
                pc.promote().unwrap()
            } else {
                pc
            };
            board_key ^= zobrist_psq(pc, from) ^ zobrist_psq(moved_pc, to);
        }

        board_key.wrapping_add(hand_key)
    }

    // ========== 王手判定 ==========

    /// 指し手mが敵玉への王手になるか
    ///
    /// mはpseudo-legalであることが前提。
    pub fn gives_check(&self, m: Move) -> bool {
        let us = self.side_to_move;
        let to = m.to();

        if m.is_drop() {
            // 打った駒の利きが敵玉に届くか
            return self.check_squares(m.drop_piece_type()).contains(to);
        }

        let from = m.from();
        let pc = self.piece_on(from);
        debug_assert!(pc.is_some() && pc.color() == us);

        // 直接王手
        let moved_pt = if m.is_promote() {
            pc.piece_type().promote().unwrap()
        } else {
            pc.piece_type()
        };
        if self.check_squares(moved_pt).contains(to) {
            return true;
        }

        // 開き王手: fromが敵玉へのblockerで、移動先が玉との直線から外れる
        let them = !us;
        let ksq = self.king_square[them.index()];
        if self.blockers_for_king(them).contains(from) && !aligned(ksq, from, to) {
            return true;
        }

        false
    }

    // ========== 指し手の変換 ==========

    /// 指し手で動く駒を取得（駒打ちなら打つ駒）
    #[inline]
    pub fn moved_piece(&self, m: Move) -> Piece {
        if m.is_drop() {
            Piece::new(self.side_to_move, m.drop_piece_type())
        } else {
            self.piece_on(m.from())
        }
    }

    /// 捕獲する指し手か
    #[inline]
    pub fn is_capture(&self, m: Move) -> bool {
        !m.is_drop() && m.is_ok() && self.piece_on(m.to()).is_some()
    }

    /// 置換表等から取り出した16bit指し手を32bit化する
    ///
    /// 移動元の駒（成りなら成った後の駒）を解決して駒情報を付与する。
    /// 明らかに現局面と不整合な指し手はMove::NONEが返る。
    /// 合法性までは保証しないので、別途pseudo_legal()/legal()で検査すること。
    pub fn to_move(&self, m: Move16) -> Move {
        if !m.is_ok() {
            // none/null/resign/winはそのまま32bit化
            return m.to_move();
        }
        if Move16::from_u16_checked(m.raw()).is_none() {
            return Move::NONE;
        }

        let us = self.side_to_move;
        if m.is_drop() {
            let pt = m.drop_piece_type();
            if !self.hand(us).has(pt) {
                return Move::NONE;
            }
            Move::new_drop_with_piece(pt, m.to(), Piece::new(us, pt))
        } else {
            let pc = self.piece_on(m.from());
            if pc.is_none() || pc.color() != us {
                return Move::NONE;
            }
            let after = if m.is_promote() {
                match pc.promote() {
                    Some(p) => p,
                    None => return Move::NONE,
                }
            } else {
                pc
            };
            Move::new_move_with_piece(m.from(), m.to(), m.is_promote(), after)
        }
    }

    /// USI形式の指し手文字列を現局面で解決してMoveにする
    pub fn move_from_usi(&self, s: &str) -> Option<Move> {
        let m16 = Move16::from_usi(s)?;
        let m = self.to_move(m16);
        if m.is_none() && !m16.is_none() {
            return None;
        }
        Some(m)
    }

    // ========== 千日手判定 ==========

    /// 現局面の千日手分類（do_move時に計算されたキャッシュを返す）
    #[inline]
    pub fn repetition_state(&self) -> RepetitionState {
        self.state().repetition_type
    }

    /// 同一局面が見つかった場合の遡り手数（0 = なし）
    #[inline]
    pub fn repetition_distance(&self) -> i32 {
        self.state().repetition
    }

    /// 現局面と同一の局面を遡って探し、千日手・優等・劣等を分類する
    ///
    /// 遡り上限はmax_repetition_plyとplies_from_null（null move以前には
    /// 遡らない）とチェーンの実深さの最小値。上限超過はエラーではなく
    /// 切り詰め。
    fn classify_repetition(&mut self) {
        let idx = self.states.len() - 1;
        let stm = self.side_to_move;

        let st = &self.states[idx];
        let end = self
            .max_repetition_ply
            .min(st.plies_from_null)
            .min(idx as i32);
        if end < 4 {
            return;
        }

        let board_key = st.board_key;
        let hand = st.hand;
        let cont_us = st.continuous_check[stm.index()];
        let cont_them = st.continuous_check[(!stm).index()];

        // 手番が一致するのは偶数手前だけなので2手ずつ遡る
        let mut i = 4;
        while i <= end {
            let stp = &self.states[idx - i as usize];
            if stp.board_key == board_key {
                if stp.hand == hand {
                    // 同一局面。出現回数は一致した祖先のカウントを引き継ぐ。
                    let times = stp.repetition_times + 1;
                    let ty = if times >= 3 {
                        // 4回目の出現で確定。連続王手が循環全体を覆っていれば
                        // 王手をかけ続けた側の負け。
                        if i <= cont_us {
                            RepetitionState::Lose
                        } else if i <= cont_them {
                            RepetitionState::Win
                        } else {
                            RepetitionState::Draw
                        }
                    } else {
                        RepetitionState::None
                    };
                    let st = &mut self.states[idx];
                    st.repetition = i;
                    st.repetition_times = times;
                    st.repetition_type = ty;
                } else {
                    // 盤面だけ一致。手駒の優劣で即時に分類（回数は問わない）。
                    let ty = if hand.is_equal_or_superior(stp.hand) {
                        RepetitionState::Superior
                    } else if stp.hand.is_equal_or_superior(hand) {
                        RepetitionState::Inferior
                    } else {
                        // 優劣つかず。より古い一致を探し続ける。
                        i += 2;
                        continue;
                    };
                    let st = &mut self.states[idx];
                    st.repetition = i;
                    st.repetition_type = ty;
                }
                return;
            }
            i += 2;
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Position {
    /// 盤面・手駒・手番のテキストダンプ（デバッグ・ログ用）
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for rank in crate::types::Rank::ALL {
            write!(f, "P{}", rank.index() + 1)?;
            for file in crate::types::File::ALL.iter().rev() {
                let pc = self.piece_on(Square::new(*file, rank));
                if pc.is_none() {
                    write!(f, " * ")?;
                } else {
                    let c = if pc.color() == Color::Black { "+" } else { "-" };
                    let name = match pc.piece_type() {
                        PieceType::Pawn => "FU",
                        PieceType::Lance => "KY",
                        PieceType::Knight => "KE",
                        PieceType::Silver => "GI",
                        PieceType::Bishop => "KA",
                        PieceType::Rook => "HI",
                        PieceType::Gold => "KI",
                        PieceType::King => "OU",
                        PieceType::ProPawn => "TO",
                        PieceType::ProLance => "NY",
                        PieceType::ProKnight => "NK",
                        PieceType::ProSilver => "NG",
                        PieceType::Horse => "UM",
                        PieceType::Dragon => "RY",
                    };
                    write!(f, "{c}{name}")?;
                }
            }
            writeln!(f)?;
        }
        writeln!(f, "turn: {:?}  ply: {}", self.side_to_move, self.game_ply)?;
        write!(f, "sfen: {}", self.to_sfen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{File, Rank};

    fn sq(f: File, r: Rank) -> Square {
        Square::new(f, r)
    }

    /// 玉2枚だけの簡単な局面を作る
    fn two_kings() -> Position {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/9/9/9/9/4K4 b - 1").unwrap();
        pos
    }

    #[test]
    fn test_position_new() {
        let pos = Position::new();
        assert_eq!(pos.side_to_move(), Color::Black);
        assert!(pos.occupied().is_empty());
        assert_eq!(pos.key(), 0);
    }

    #[test]
    fn test_attackers_to() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/4P4/9/9/9/4K4 b - 1").unwrap();

        // 5五の先手歩は5四に利く
        let attackers = pos.attackers_to(sq(File::File5, Rank::Rank4));
        assert!(attackers.contains(Square::SQ_55));

        // 5六には利かない
        let attackers = pos.attackers_to(sq(File::File5, Rank::Rank6));
        assert!(!attackers.contains(Square::SQ_55));
    }

    #[test]
    fn test_attackers_to_occ_vacated() {
        // 5五の飛の後ろ（5七）に歩。5七をどけたと仮定すると飛が5八に利く。
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/4R4/9/4P4/9/4K4 b - 1").unwrap();

        let sq58 = sq(File::File5, Rank::Rank8);
        let sq57 = sq(File::File5, Rank::Rank7);
        assert!(!pos.attackers_to(sq58).contains(Square::SQ_55));

        let occ = pos.occupied() ^ Bitboard::from_square(sq57);
        assert!(pos.attackers_to_occ(sq58, occ).contains(Square::SQ_55));
    }

    #[test]
    fn test_do_move_normal_and_undo() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/9/9/2P6/9/4K4 b - 1").unwrap();
        let sq77 = sq(File::File7, Rank::Rank7);
        let sq76 = sq(File::File7, Rank::Rank6);

        let key_before = pos.key();
        let m = Move::new_move(sq77, sq76, false);

        pos.do_move(m, false);
        assert_eq!(pos.piece_on(sq77), Piece::NONE);
        assert_eq!(pos.piece_on(sq76), Piece::B_PAWN);
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.captured_piece(), Piece::NONE);
        assert_ne!(pos.key(), key_before);

        pos.undo_move(m);
        assert_eq!(pos.piece_on(sq77), Piece::B_PAWN);
        assert_eq!(pos.piece_on(sq76), Piece::NONE);
        assert_eq!(pos.side_to_move(), Color::Black);
        assert_eq!(pos.key(), key_before);
    }

    #[test]
    fn test_do_move_capture_and_undo() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/2p6/2P6/9/9/4K4 b - 1").unwrap();

        let sq76 = sq(File::File7, Rank::Rank6);
        let sq75 = sq(File::File7, Rank::Rank5);
        let key_before = pos.key();
        let m = Move::new_move(sq76, sq75, false);

        pos.do_move(m, false);
        assert_eq!(pos.piece_on(sq75), Piece::B_PAWN);
        assert_eq!(pos.captured_piece(), Piece::W_PAWN);
        assert!(pos.hand(Color::Black).has(PieceType::Pawn));

        pos.undo_move(m);
        assert_eq!(pos.piece_on(sq76), Piece::B_PAWN);
        assert_eq!(pos.piece_on(sq75), Piece::W_PAWN);
        assert!(!pos.hand(Color::Black).has(PieceType::Pawn));
        assert_eq!(pos.key(), key_before);
    }

    #[test]
    fn test_do_move_drop_and_undo() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/9/9/9/9/4K4 b P 1").unwrap();

        let to = Square::SQ_55;
        let m = Move::new_drop(PieceType::Pawn, to);
        let key_before = pos.key();

        pos.do_move(m, false);
        assert_eq!(pos.piece_on(to), Piece::B_PAWN);
        assert!(!pos.hand(Color::Black).has(PieceType::Pawn));
        assert_ne!(pos.key(), key_before);

        pos.undo_move(m);
        assert_eq!(pos.piece_on(to), Piece::NONE);
        assert!(pos.hand(Color::Black).has(PieceType::Pawn));
        assert_eq!(pos.key(), key_before);
    }

    #[test]
    fn test_do_move_promote_and_undo() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/7P1/9/9/9/9/9/4K4 b - 1").unwrap();

        let from = sq(File::File2, Rank::Rank3);
        let to = sq(File::File2, Rank::Rank2);
        let m = Move::new_move(from, to, true);
        let key_before = pos.key();

        pos.do_move(m, false);
        assert_eq!(pos.piece_on(to), Piece::B_PRO_PAWN);

        pos.undo_move(m);
        assert_eq!(pos.piece_on(from), Piece::B_PAWN);
        assert_eq!(pos.key(), key_before);
    }

    #[test]
    fn test_king_move_updates_cache() {
        let mut pos = two_kings();
        let from = Square::SQ_59;
        let to = sq(File::File4, Rank::Rank8);
        let m = Move::new_move(from, to, false);

        pos.do_move(m, false);
        assert_eq!(pos.king_square(Color::Black), to);
        pos.undo_move(m);
        assert_eq!(pos.king_square(Color::Black), from);
    }

    #[test]
    fn test_null_move() {
        let mut pos = two_kings();
        let key_before = pos.key();

        pos.do_null_move();
        assert_eq!(pos.side_to_move(), Color::White);
        assert_ne!(pos.key(), key_before);
        assert_eq!(pos.state().plies_from_null, 0);

        pos.undo_null_move();
        assert_eq!(pos.side_to_move(), Color::Black);
        assert_eq!(pos.key(), key_before);
    }

    #[test]
    fn test_key_after_matches_do_move() {
        let mut pos = Position::new();
        pos.set_hirate();

        for usi in ["7g7f", "P*5e"] {
            // P*5e用に手駒を足した局面も試す
            if usi.starts_with('P') {
                pos.set_sfen("lnsgkgsnl/1r5b1/ppppppppp/9/9/9/PPPPPPPPP/1B5R1/LNSGKGSNL b P 1")
                    .unwrap();
            }
            let m = pos.move_from_usi(usi).unwrap();
            let predicted = pos.key_after(m);
            pos.do_move(m, pos.gives_check(m));
            assert_eq!(pos.key(), predicted, "usi={usi}");
            pos.undo_move(m);
        }
    }

    #[test]
    fn test_gives_check_direct() {
        // 5五の金を5二へ -> 5一玉に王手
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/4G4/9/9/9/4K4 b - 1").unwrap();

        let m = Move::new_move(Square::SQ_55, sq(File::File5, Rank::Rank2), false);
        assert!(pos.gives_check(m));

        let m2 = Move::new_move(Square::SQ_55, sq(File::File4, Rank::Rank5), false);
        assert!(!pos.gives_check(m2));
    }

    #[test]
    fn test_gives_check_discovered() {
        // 5五の銀が5一玉と5九の飛の間にいる。銀が横へ動くと開き王手。
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/4S4/9/9/9/4RK3 b - 1").unwrap();

        let m = Move::new_move(Square::SQ_55, sq(File::File4, Rank::Rank4), false);
        assert!(pos.gives_check(m));

        // 同じ直線上に留まる移動は開き王手にならない
        let m2 = Move::new_move(Square::SQ_55, sq(File::File5, Rank::Rank4), false);
        assert!(!pos.gives_check(m2));
    }

    #[test]
    fn test_gives_check_drop() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/9/9/9/9/4K4 b G 1").unwrap();

        // 5二金打は王手
        let m = Move::new_drop(PieceType::Gold, sq(File::File5, Rank::Rank2));
        assert!(pos.gives_check(m));

        // 5五金打は王手でない
        let m2 = Move::new_drop(PieceType::Gold, Square::SQ_55);
        assert!(!pos.gives_check(m2));
    }

    #[test]
    fn test_checkers_after_check() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/4G4/9/9/9/4K4 b - 1").unwrap();

        let to = sq(File::File5, Rank::Rank2);
        let m = Move::new_move(Square::SQ_55, to, false);
        pos.do_move(m, true);

        assert!(pos.in_check());
        assert_eq!(pos.checkers().count(), 1);
        assert!(pos.checkers().contains(to));
        assert_eq!(pos.state().continuous_check[Color::Black.index()], 2);
    }

    #[test]
    fn test_pin_detection() {
        // 5九玉、5五銀（自駒）、5一飛（敵）: 銀はpin、飛はpinner
        let mut pos = Position::new();
        pos.set_sfen("4r4/9/9/9/4S4/9/9/9/4K4 b - 1").unwrap();

        let rook_sq = sq(File::File5, Rank::Rank1);
        assert!(pos.blockers_for_king(Color::Black).contains(Square::SQ_55));
        assert!(pos.pinners(Color::Black).contains(rook_sq));
        assert!(pos.pinned_pieces(Color::Black).contains(Square::SQ_55));

        // 間にもう1枚（5三歩）入るとpinは消える
        pos.set_sfen("4r4/9/4p4/9/4S4/9/9/9/4K4 b - 1").unwrap();
        assert!(pos.blockers_for_king(Color::Black).is_empty());
        assert!(pos.pinners(Color::Black).is_empty());
    }

    #[test]
    fn test_blockers_include_enemy_pieces() {
        // 敵の駒がblockerの場合（pinnerにはならない）
        let mut pos = Position::new();
        pos.set_sfen("4r4/9/9/9/4p4/9/9/9/4K4 b - 1").unwrap();

        assert!(pos.blockers_for_king(Color::Black).contains(Square::SQ_55));
        assert!(pos.pinners(Color::Black).is_empty());
    }

    #[test]
    fn test_bitboard_consistency_after_moves() {
        let mut pos = Position::new();
        pos.set_hirate();

        for usi in ["7g7f", "3c3d", "8h2b+", "3a2b"] {
            let m = pos.move_from_usi(usi).unwrap();
            pos.do_move(m, pos.gives_check(m));

            // 駒種別の合併 = 手番別占有、両手番は素
            for c in Color::ALL {
                let mut union = Bitboard::EMPTY;
                for pt in 1..=PieceType::NUM {
                    let pt = PieceType::from_u8(pt as u8).unwrap();
                    union |= pos.pieces(c, pt);
                }
                assert_eq!(union, pos.pieces_c(c), "after {usi}");
            }
            assert!((pos.pieces_c(Color::Black) & pos.pieces_c(Color::White)).is_empty());
        }
    }

    #[test]
    fn test_dirty_piece_records() {
        let mut pos = Position::new();
        pos.set_sfen("4k4/9/9/9/2p6/2P6/9/9/4K4 b P 1").unwrap();

        // 捕獲: 動いた駒 + 消えた駒 + 手駒変化
        let m = pos.move_from_usi("7f7e").unwrap();
        pos.do_move(m, false);
        let dp = &pos.state().dirty_piece;
        assert_eq!(dp.pieces().len(), 2);
        assert_eq!(dp.pieces()[0].old_piece, Piece::B_PAWN);
        assert_eq!(dp.pieces()[0].new_sq, Some(sq(File::File7, Rank::Rank5)));
        assert_eq!(dp.pieces()[1].old_piece, Piece::W_PAWN);
        assert_eq!(dp.pieces()[1].new_piece, Piece::NONE);
        let hc = dp.hand_change().unwrap();
        assert_eq!(hc.owner, Color::Black);
        assert_eq!(hc.piece_type, PieceType::Pawn);
        assert_eq!((hc.old_count, hc.new_count), (1, 2));
        pos.undo_move(m);

        // 打ち: 現れた駒1つ + 手駒変化
        let m = pos.move_from_usi("P*5e").unwrap();
        pos.do_move(m, false);
        let dp = &pos.state().dirty_piece;
        assert_eq!(dp.pieces().len(), 1);
        assert_eq!(dp.pieces()[0].old_sq, None);
        assert_eq!(dp.pieces()[0].new_piece, Piece::B_PAWN);
        assert_eq!(dp.hand_change().unwrap().new_count, 0);
        pos.undo_move(m);

        // 玉の移動フラグ
        let m = pos.move_from_usi("5i4i").unwrap();
        pos.do_move(m, false);
        assert!(pos.state().dirty_piece.king_moved[Color::Black.index()]);
        assert!(pos.state().dirty_piece.hand_change().is_none());
    }

    #[test]
    fn test_to_move_validates() {
        let mut pos = Position::new();
        pos.set_hirate();

        // 正常な指し手には駒情報が付く
        let m16 = Move16::from_usi("7g7f").unwrap();
        let m = pos.to_move(m16);
        assert!(m.is_ok());
        assert_eq!(m.moved_piece_after(), Piece::B_PAWN);

        // 移動元に駒がない
        let m16 = Move16::from_usi("5e5d").unwrap();
        assert!(pos.to_move(m16).is_none());

        // 相手の駒を動かそうとしている
        let m16 = Move16::from_usi("3c3d").unwrap();
        assert!(pos.to_move(m16).is_none());

        // 手駒にない駒打ち
        let m16 = Move16::from_usi("G*5e").unwrap();
        assert!(pos.to_move(m16).is_none());

        // 成れない駒の成り
        let m16 = Move16::from_usi("5i5h+").unwrap();
        assert!(pos.to_move(m16).is_none());
    }
}
