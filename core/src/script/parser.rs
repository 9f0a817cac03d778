//! Recursive-descent parser producing the tree the interpreter walks.

use std::rc::Rc;

use super::ast::*;
use super::error::{Result, ScriptError};
use super::lexer::{Lexer, Tok, Token};

/// Parse a whole chunk. The source is expected to have gone through the
/// sugar pass already.
pub fn parse(source: &str) -> Result<Block> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let block = parser.block()?;
    parser.expect(&Tok::Eof)?;
    Ok(block)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn cur(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Tok {
        let tok = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.cur() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<()> {
        if self.cur() == tok {
            self.advance();
            Ok(())
        } else {
            Err(ScriptError::syntax(
                self.line(),
                format!("expected {:?}, found {:?}", tok, self.cur()),
            ))
        }
    }

    fn expect_name(&mut self) -> Result<String> {
        match self.cur().clone() {
            Tok::Name(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ScriptError::syntax(
                self.line(),
                format!("expected a name, found {:?}", other),
            )),
        }
    }

    fn block_ends(&self) -> bool {
        matches!(
            self.cur(),
            Tok::End | Tok::Else | Tok::Elseif | Tok::Until | Tok::Eof
        )
    }

    fn block(&mut self) -> Result<Block> {
        let mut stats = Vec::new();
        loop {
            if self.eat(&Tok::Semi) {
                continue;
            }
            if self.block_ends() {
                return Ok(stats);
            }
            stats.push(self.stat()?);
        }
    }

    fn stat(&mut self) -> Result<Stat> {
        let line = self.line();
        let kind = match self.cur() {
            Tok::Local => self.local_stat()?,
            Tok::Function => self.function_stat()?,
            Tok::If => self.if_stat()?,
            Tok::While => self.while_stat()?,
            Tok::Repeat => self.repeat_stat()?,
            Tok::For => self.for_stat()?,
            Tok::Do => {
                self.advance();
                let body = self.block()?;
                self.expect(&Tok::End)?;
                StatKind::Do(body)
            }
            Tok::Return => {
                self.advance();
                let value = if self.block_ends() || self.cur() == &Tok::Semi {
                    None
                } else {
                    Some(self.expr()?)
                };
                StatKind::Return(value)
            }
            Tok::Break => {
                self.advance();
                StatKind::Break
            }
            _ => self.expr_stat()?,
        };
        Ok(Stat { line, kind })
    }

    fn local_stat(&mut self) -> Result<StatKind> {
        self.advance();
        if self.eat(&Tok::Function) {
            let name = self.expect_name()?;
            let def = self.fn_body(name.clone())?;
            return Ok(StatKind::LocalFunction(name, def));
        }
        let mut names = vec![self.expect_name()?];
        while self.eat(&Tok::Comma) {
            names.push(self.expect_name()?);
        }
        let exprs = if self.eat(&Tok::Assign) {
            self.expr_list()?
        } else {
            Vec::new()
        };
        Ok(StatKind::Local(names, exprs))
    }

    /// `function a.b.c() ... end` desugars to an assignment.
    fn function_stat(&mut self) -> Result<StatKind> {
        self.advance();
        let first = self.expect_name()?;
        let mut full_name = first.clone();
        let mut path = Vec::new();
        while self.eat(&Tok::Dot) {
            let part = self.expect_name()?;
            full_name.push('.');
            full_name.push_str(&part);
            path.push(part);
        }
        let def = self.fn_body(full_name)?;
        let target = match path.split_last() {
            None => LValue::Var(first),
            Some((last, mids)) => {
                let mut base = Expr::Var(first);
                for mid in mids {
                    base = Expr::Field(Box::new(base), mid.clone());
                }
                LValue::Field(base, last.clone())
            }
        };
        Ok(StatKind::Assign(
            vec![target],
            vec![Expr::Function(def)],
        ))
    }

    fn fn_body(&mut self, name: String) -> Result<Rc<FnDef>> {
        self.expect(&Tok::LParen)?;
        let mut params = Vec::new();
        if self.cur() != &Tok::RParen {
            params.push(self.expect_name()?);
            while self.eat(&Tok::Comma) {
                params.push(self.expect_name()?);
            }
        }
        self.expect(&Tok::RParen)?;
        let body = self.block()?;
        self.expect(&Tok::End)?;
        Ok(Rc::new(FnDef { name, params, body }))
    }

    fn if_stat(&mut self) -> Result<StatKind> {
        self.advance();
        let mut arms = Vec::new();
        let cond = self.expr()?;
        self.expect(&Tok::Then)?;
        arms.push((cond, self.block()?));
        let mut otherwise = None;
        loop {
            if self.eat(&Tok::Elseif) {
                let cond = self.expr()?;
                self.expect(&Tok::Then)?;
                arms.push((cond, self.block()?));
            } else if self.eat(&Tok::Else) {
                otherwise = Some(self.block()?);
                self.expect(&Tok::End)?;
                break;
            } else {
                self.expect(&Tok::End)?;
                break;
            }
        }
        Ok(StatKind::If(arms, otherwise))
    }

    fn while_stat(&mut self) -> Result<StatKind> {
        self.advance();
        let cond = self.expr()?;
        self.expect(&Tok::Do)?;
        let body = self.block()?;
        self.expect(&Tok::End)?;
        Ok(StatKind::While(cond, body))
    }

    fn repeat_stat(&mut self) -> Result<StatKind> {
        self.advance();
        let body = self.block()?;
        self.expect(&Tok::Until)?;
        let cond = self.expr()?;
        Ok(StatKind::Repeat(body, cond))
    }

    fn for_stat(&mut self) -> Result<StatKind> {
        self.advance();
        let var = self.expect_name()?;
        self.expect(&Tok::Assign)?;
        let start = self.expr()?;
        self.expect(&Tok::Comma)?;
        let stop = self.expr()?;
        let step = if self.eat(&Tok::Comma) {
            Some(self.expr()?)
        } else {
            None
        };
        self.expect(&Tok::Do)?;
        let body = self.block()?;
        self.expect(&Tok::End)?;
        Ok(StatKind::NumericFor {
            var,
            start,
            stop,
            step,
            body,
        })
    }

    /// Either an assignment or a bare call.
    fn expr_stat(&mut self) -> Result<StatKind> {
        let line = self.line();
        let first = self.suffixed()?;
        if self.cur() == &Tok::Assign || self.cur() == &Tok::Comma {
            let mut targets = vec![self.to_lvalue(first, line)?];
            while self.eat(&Tok::Comma) {
                let e = self.suffixed()?;
                targets.push(self.to_lvalue(e, line)?);
            }
            self.expect(&Tok::Assign)?;
            let values = self.expr_list()?;
            return Ok(StatKind::Assign(targets, values));
        }
        match first {
            Expr::Call(..) => Ok(StatKind::Call(first)),
            _ => Err(ScriptError::syntax(line, "expected a statement")),
        }
    }

    fn to_lvalue(&self, e: Expr, line: u32) -> Result<LValue> {
        match e {
            Expr::Var(name) => Ok(LValue::Var(name)),
            Expr::Field(base, name) => Ok(LValue::Field(*base, name)),
            Expr::Index(base, key) => Ok(LValue::Index(*base, *key)),
            _ => Err(ScriptError::syntax(line, "cannot assign to this expression")),
        }
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = vec![self.expr()?];
        while self.eat(&Tok::Comma) {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    // --- expressions, precedence climbing ---

    fn expr(&mut self) -> Result<Expr> {
        self.binary(0)
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some((op, prec, right_assoc)) = bin_op(self.cur()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = if right_assoc { prec } else { prec + 1 };
            let rhs = self.binary(next_min)?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    const UNARY_PREC: u8 = 7;

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.cur() {
            Tok::Not => Some(UnOp::Not),
            Tok::Minus => Some(UnOp::Neg),
            Tok::Hash => Some(UnOp::Len),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.binary(Self::UNARY_PREC)?;
            return Ok(Expr::UnOp(op, Box::new(operand)));
        }
        self.power()
    }

    /// `^` binds tighter than unary and associates right: `-x^2` is
    /// `-(x^2)`.
    fn power(&mut self) -> Result<Expr> {
        let base = self.suffixed()?;
        if self.eat(&Tok::Caret) {
            let exp = self.binary(Self::UNARY_PREC)?;
            return Ok(Expr::BinOp(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn suffixed(&mut self) -> Result<Expr> {
        let mut e = self.primary()?;
        loop {
            match self.cur() {
                Tok::Dot => {
                    self.advance();
                    let name = self.expect_name()?;
                    e = Expr::Field(Box::new(e), name);
                }
                Tok::LBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.expect(&Tok::RBracket)?;
                    e = Expr::Index(Box::new(e), Box::new(key));
                }
                Tok::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if self.cur() != &Tok::RParen {
                        args = self.expr_list()?;
                    }
                    self.expect(&Tok::RParen)?;
                    e = Expr::Call(Box::new(e), args);
                }
                _ => return Ok(e),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let line = self.line();
        match self.cur().clone() {
            Tok::Nil => {
                self.advance();
                Ok(Expr::Nil)
            }
            Tok::True => {
                self.advance();
                Ok(Expr::True)
            }
            Tok::False => {
                self.advance();
                Ok(Expr::False)
            }
            Tok::Num(n) => {
                self.advance();
                Ok(Expr::Num(n))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(Rc::from(s.as_str())))
            }
            Tok::Name(name) => {
                self.advance();
                Ok(Expr::Var(name))
            }
            Tok::LParen => {
                self.advance();
                let e = self.expr()?;
                self.expect(&Tok::RParen)?;
                Ok(e)
            }
            Tok::Function => {
                self.advance();
                let def = self.fn_body("?".to_string())?;
                Ok(Expr::Function(def))
            }
            Tok::LBrace => self.table(),
            other => Err(ScriptError::syntax(
                line,
                format!("unexpected {:?}", other),
            )),
        }
    }

    fn table(&mut self) -> Result<Expr> {
        self.expect(&Tok::LBrace)?;
        let mut fields = Vec::new();
        loop {
            if self.eat(&Tok::RBrace) {
                return Ok(Expr::Table(fields));
            }
            match self.cur().clone() {
                Tok::LBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.expect(&Tok::RBracket)?;
                    self.expect(&Tok::Assign)?;
                    fields.push((TableKey::Computed(key), self.expr()?));
                }
                Tok::Name(name) if self.tokens[self.pos + 1].tok == Tok::Assign => {
                    self.advance();
                    self.advance();
                    fields.push((TableKey::Named(name), self.expr()?));
                }
                _ => {
                    fields.push((TableKey::Auto, self.expr()?));
                }
            }
            if !self.eat(&Tok::Comma) && !self.eat(&Tok::Semi) {
                self.expect(&Tok::RBrace)?;
                return Ok(Expr::Table(fields));
            }
        }
    }
}

fn bin_op(tok: &Tok) -> Option<(BinOp, u8, bool)> {
    let entry = match tok {
        Tok::Or => (BinOp::Or, 1, false),
        Tok::And => (BinOp::And, 2, false),
        Tok::Lt => (BinOp::Lt, 3, false),
        Tok::Gt => (BinOp::Gt, 3, false),
        Tok::Le => (BinOp::Le, 3, false),
        Tok::Ge => (BinOp::Ge, 3, false),
        Tok::Ne => (BinOp::Ne, 3, false),
        Tok::Eq => (BinOp::Eq, 3, false),
        Tok::Concat => (BinOp::Concat, 4, true),
        Tok::Plus => (BinOp::Add, 5, false),
        Tok::Minus => (BinOp::Sub, 5, false),
        Tok::Star => (BinOp::Mul, 6, false),
        Tok::Slash => (BinOp::Div, 6, false),
        Tok::Percent => (BinOp::Mod, 6, false),
        _ => return None,
    };
    Some(entry)
}
