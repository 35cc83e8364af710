use logos::Logos;

use crate::ast::{
    AssignOp, BinOp, Block, CallArg, ClassDecl, DirectiveApplication, DirectiveDecl, EnumDecl,
    FunDecl, FunLit, Node, NodeKind, SlotDecl, TypeNode, Visibility,
};
use crate::errors::{Error, ErrorKind, Result};
use crate::syntax::{Span, Token};

/// Parse a source string into a list of top-level forms.
pub fn parse(source: &str) -> Result<Vec<Node>> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let span = Span::new(lexer.span().start, lexer.span().end);
        match result {
            Ok(Token::Comment) => continue,
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(Error::at(
                    ErrorKind::Parse(format!("unexpected character {:?}", lexer.slice())),
                    span,
                ))
            }
        }
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };
    parser.parse_forms_until(None)
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or(Span::new(self.end, self.end))
    }

    fn prev_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|(_, s)| *s)
            .unwrap_or(Span::new(self.end, self.end))
    }

    fn advance(&mut self) -> Option<(Token, Span)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<Span> {
        match self.advance() {
            Some((found, span)) if found == token => Ok(span),
            Some((found, span)) => Err(Error::at(
                ErrorKind::Parse(format!("expected {token:?}, found {found:?}")),
                span,
            )),
            None => Err(Error::at(
                ErrorKind::Parse(format!("expected {token:?}, found end of input")),
                Span::new(self.end, self.end),
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span)> {
        match self.advance() {
            Some((Token::Ident(name), span)) => Ok((name, span)),
            Some((found, span)) => Err(Error::at(
                ErrorKind::Parse(format!("expected an identifier, found {found:?}")),
                span,
            )),
            None => Err(Error::at(
                ErrorKind::Parse("expected an identifier, found end of input".into()),
                Span::new(self.end, self.end),
            )),
        }
    }

    fn parse_forms_until(&mut self, terminator: Option<&Token>) -> Result<Vec<Node>> {
        let mut forms = Vec::new();
        loop {
            match self.peek() {
                None => {
                    if terminator.is_some() {
                        return Err(Error::at(
                            ErrorKind::Parse("unexpected end of input".into()),
                            Span::new(self.end, self.end),
                        ));
                    }
                    return Ok(forms);
                }
                Some(token) if Some(token) == terminator => return Ok(forms),
                _ => forms.push(self.parse_form()?),
            }
        }
    }

    fn parse_form(&mut self) -> Result<Node> {
        let doc = self.parse_doc_comment();
        let directives = self.parse_directive_applications()?;

        match self.peek() {
            Some(Token::Pub) | Some(Token::Let) => self.parse_binding(doc, directives),
            Some(Token::Type) => self.parse_class(doc, directives),
            Some(Token::Enum) => self.parse_enum(doc),
            Some(Token::Directive) => self.parse_directive_decl(doc),
            Some(Token::Assert) => {
                let start = self.peek_span();
                self.advance();
                let expr = self.parse_expr()?;
                let span = start.join(expr.span);
                Ok(Node::new(NodeKind::Assert(Box::new(expr)), span))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.maybe_assignment(expr)
            }
        }
    }

    fn parse_doc_comment(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        while let Some(Token::DocComment(text)) = self.peek() {
            lines.push(text.clone());
            self.advance();
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    fn parse_directive_applications(&mut self) -> Result<Vec<DirectiveApplication>> {
        let mut apps = Vec::new();
        while self.peek() == Some(&Token::At) {
            let start = self.peek_span();
            self.advance();
            let (name, _) = self.expect_ident()?;
            let args = if self.peek() == Some(&Token::LParen) {
                self.parse_call_args()?
            } else {
                Vec::new()
            };
            apps.push(DirectiveApplication {
                name,
                args,
                span: start.join(self.prev_span()),
            });
        }
        Ok(apps)
    }

    /// `pub`/`let` bindings: slots, functions, and zero-argument function
    /// sugar (`pub f: Int! { ... }`).
    fn parse_binding(
        &mut self,
        doc: Option<String>,
        directives: Vec<DirectiveApplication>,
    ) -> Result<Node> {
        let start = self.peek_span();
        let visibility = match self.advance() {
            Some((Token::Pub, _)) => Visibility::Public,
            _ => Visibility::Private,
        };
        let (name, _) = self.expect_ident()?;

        if self.peek() == Some(&Token::LParen) {
            let args = self.parse_param_list()?;
            let ret = if self.eat(&Token::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let body = self.parse_block()?;
            let span = start.join(self.prev_span());
            return Ok(Node::new(
                NodeKind::Fun(FunDecl {
                    name,
                    args,
                    ret,
                    body,
                    visibility,
                    directives,
                    doc,
                }),
                span,
            ));
        }

        if self.eat(&Token::Colon) {
            let ty = self.parse_type()?;
            if self.peek() == Some(&Token::LBrace) {
                // Zero-argument function: `pub f: Int! { 42 }`.
                let body = self.parse_block()?;
                let span = start.join(self.prev_span());
                return Ok(Node::new(
                    NodeKind::Fun(FunDecl {
                        name,
                        args: Vec::new(),
                        ret: Some(ty),
                        body,
                        visibility,
                        directives,
                        doc,
                    }),
                    span,
                ));
            }
            let value = if self.eat(&Token::Eq) {
                Some(Box::new(self.parse_expr()?))
            } else {
                None
            };
            let span = start.join(self.prev_span());
            return Ok(Node::new(
                NodeKind::Slot(SlotDecl {
                    name,
                    ty: Some(ty),
                    value,
                    visibility,
                    directives,
                    doc,
                    span,
                }),
                span,
            ));
        }

        let value = if self.eat(&Token::Eq) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        let span = start.join(self.prev_span());
        Ok(Node::new(
            NodeKind::Slot(SlotDecl {
                name,
                ty: None,
                value,
                visibility,
                directives,
                doc,
                span,
            }),
            span,
        ))
    }

    fn parse_class(
        &mut self,
        doc: Option<String>,
        directives: Vec<DirectiveApplication>,
    ) -> Result<Node> {
        let start = self.peek_span();
        self.advance();
        let (name, _) = self.expect_ident()?;
        let mut implements = Vec::new();
        if self.eat(&Token::Implements) {
            loop {
                let (iface, _) = self.expect_ident()?;
                implements.push(iface);
                if !self.eat(&Token::Comma) && !matches!(self.peek(), Some(Token::Ident(_))) {
                    break;
                }
            }
        }
        let body = self.parse_block()?;
        let span = start.join(self.prev_span());
        Ok(Node::new(
            NodeKind::Class(ClassDecl {
                name,
                implements,
                body,
                visibility: Visibility::Public,
                directives,
                doc,
            }),
            span,
        ))
    }

    fn parse_enum(&mut self, doc: Option<String>) -> Result<Node> {
        let start = self.peek_span();
        self.advance();
        let (name, _) = self.expect_ident()?;
        self.expect(Token::LBrace)?;
        let mut values = Vec::new();
        while let Some(Token::Ident(_)) = self.peek() {
            let (value, _) = self.expect_ident()?;
            values.push(value);
            self.eat(&Token::Comma);
        }
        self.expect(Token::RBrace)?;
        let span = start.join(self.prev_span());
        Ok(Node::new(
            NodeKind::Enum(EnumDecl {
                name,
                values,
                visibility: Visibility::Public,
                doc,
            }),
            span,
        ))
    }

    fn parse_directive_decl(&mut self, doc: Option<String>) -> Result<Node> {
        let start = self.peek_span();
        self.advance();
        self.expect(Token::At)?;
        let (name, _) = self.expect_ident()?;
        let args = if self.peek() == Some(&Token::LParen) {
            self.parse_param_list()?
        } else {
            Vec::new()
        };
        self.expect(Token::On)?;
        let mut locations = Vec::new();
        loop {
            let (location, _) = self.expect_ident()?;
            locations.push(location);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        let span = start.join(self.prev_span());
        Ok(Node::new(
            NodeKind::Directive(DirectiveDecl {
                name,
                args,
                locations,
                doc,
            }),
            span,
        ))
    }

    /// Parameter lists for functions and directive declarations:
    /// `(name: Type = default, ...)`.
    fn parse_param_list(&mut self) -> Result<Vec<SlotDecl>> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while self.peek() != Some(&Token::RParen) {
            let directives = self.parse_directive_applications()?;
            let start = self.peek_span();
            let (name, _) = self.expect_ident()?;
            let ty = if self.eat(&Token::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let value = if self.eat(&Token::Eq) {
                Some(Box::new(self.parse_expr()?))
            } else {
                None
            };
            params.push(SlotDecl {
                name,
                ty,
                value,
                visibility: Visibility::Private,
                directives,
                doc: None,
                span: start.join(self.prev_span()),
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(params)
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.expect(Token::LBrace)?;
        let forms = self.parse_forms_until(Some(&Token::RBrace))?;
        self.expect(Token::RBrace)?;
        Ok(Block {
            forms,
            inline: false,
        })
    }

    fn parse_type(&mut self) -> Result<TypeNode> {
        let mut ty = match self.advance() {
            Some((Token::Ident(name), span)) => TypeNode::Named(name, span),
            Some((Token::LBracket, _)) => {
                let elem = self.parse_type()?;
                self.expect(Token::RBracket)?;
                TypeNode::List(Box::new(elem))
            }
            Some((found, span)) => {
                return Err(Error::at(
                    ErrorKind::Parse(format!("expected a type, found {found:?}")),
                    span,
                ))
            }
            None => {
                return Err(Error::at(
                    ErrorKind::Parse("expected a type, found end of input".into()),
                    Span::new(self.end, self.end),
                ))
            }
        };
        while self.eat(&Token::Bang) {
            ty = TypeNode::NonNull(Box::new(ty));
        }
        Ok(ty)
    }

    fn maybe_assignment(&mut self, target: Node) -> Result<Node> {
        let op = match self.peek() {
            Some(Token::Eq) => AssignOp::Set,
            Some(Token::PlusEq) => AssignOp::Add,
            _ => return Ok(target),
        };
        self.advance();
        let mut target = target;
        clear_auto_call(&mut target);
        let value = self.parse_expr()?;
        let span = target.span.join(value.span);
        Ok(Node::new(
            NodeKind::Assign {
                target: Box::new(target),
                op,
                value: Box::new(value),
            },
            span,
        ))
    }

    // ── Expressions ──────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Node> {
        self.parse_default()
    }

    fn parse_default(&mut self) -> Result<Node> {
        let mut left = self.parse_or()?;
        while self.eat(&Token::QuestionQuestion) {
            let right = self.parse_or()?;
            let span = left.span.join(right.span);
            left = Node::new(
                NodeKind::Default {
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Node> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_equality()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Node> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Node> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Ge) => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Node> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Node> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node> {
        if self.peek() == Some(&Token::Minus) {
            let start = self.peek_span();
            self.advance();
            if let Some(Token::Int(n)) = self.peek() {
                let n = *n;
                self.advance();
                return self.parse_postfix_chain(Node::new(
                    NodeKind::Int(-n),
                    start.join(self.prev_span()),
                ));
            }
            let operand = self.parse_unary()?;
            let span = start.join(operand.span);
            let zero = Node::new(NodeKind::Int(0), start);
            return Ok(Node::new(
                NodeKind::Binary {
                    op: BinOp::Sub,
                    left: Box::new(zero),
                    right: Box::new(operand),
                },
                span,
            ));
        }
        let primary = self.parse_primary()?;
        self.parse_postfix_chain(primary)
    }

    fn parse_postfix_chain(&mut self, mut node: Node) -> Result<Node> {
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let (field, field_span) = self.expect_ident()?;
                    let span = node.span.join(field_span);
                    node = Node::new(
                        NodeKind::Select {
                            receiver: Box::new(node),
                            field,
                            auto_call: true,
                        },
                        span,
                    );
                }
                Some(Token::LParen) => {
                    // The callee is invoked explicitly; it must not
                    // auto-call first.
                    clear_auto_call(&mut node);
                    let args = self.parse_call_args()?;
                    let span = node.span.join(self.prev_span());
                    node = Node::new(
                        NodeKind::Call {
                            fun: Box::new(node),
                            args,
                        },
                        span,
                    );
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<CallArg>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        while self.peek() != Some(&Token::RParen) {
            let name = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Ident(name)), Some(Token::Colon)) => Some(name.clone()),
                _ => None,
            };
            if name.is_some() {
                self.advance();
                self.advance();
            }
            let value = self.parse_expr()?;
            args.push(CallArg { name, value });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Node> {
        match self.advance() {
            Some((Token::Int(n), span)) => Ok(Node::new(NodeKind::Int(n), span)),
            Some((Token::Str(s), span)) => Ok(Node::new(NodeKind::Str(s), span)),
            Some((Token::True, span)) => Ok(Node::new(NodeKind::Bool(true), span)),
            Some((Token::False, span)) => Ok(Node::new(NodeKind::Bool(false), span)),
            Some((Token::Null, span)) => Ok(Node::new(NodeKind::Null, span)),
            Some((Token::SelfKw, span)) => Ok(Node::new(NodeKind::SelfRef, span)),
            Some((Token::Ident(name), span)) => Ok(Node::new(
                NodeKind::Symbol {
                    name,
                    auto_call: true,
                },
                span,
            )),
            Some((Token::LParen, _)) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some((Token::LBracket, start)) => {
                let mut items = Vec::new();
                while self.peek() != Some(&Token::RBracket) {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Node::new(
                    NodeKind::ListLit(items),
                    start.join(self.prev_span()),
                ))
            }
            Some((Token::LBrace, start)) => {
                let forms = self.parse_forms_until(Some(&Token::RBrace))?;
                self.expect(Token::RBrace)?;
                let span = start.join(self.prev_span());
                // A brace group of nothing but slot declarations is a
                // record literal; anything else is a block expression.
                let all_slots = !forms.is_empty()
                    && forms
                        .iter()
                        .all(|form| matches!(form.kind, NodeKind::Slot(_)));
                if all_slots {
                    let slots = forms
                        .into_iter()
                        .map(|form| match form.kind {
                            NodeKind::Slot(slot) => slot,
                            _ => unreachable!(),
                        })
                        .collect();
                    Ok(Node::new(NodeKind::ObjectLit(slots), span))
                } else {
                    Ok(Node::new(
                        NodeKind::Block(Block {
                            forms,
                            inline: false,
                        }),
                        span,
                    ))
                }
            }
            Some((Token::Fn, start)) => {
                let args = self.parse_param_list()?;
                let ret = if self.eat(&Token::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let body = self.parse_block()?;
                let span = start.join(self.prev_span());
                Ok(Node::new(NodeKind::Lambda(FunLit { args, ret, body }), span))
            }
            Some((found, span)) => Err(Error::at(
                ErrorKind::Parse(format!("unexpected token {found:?}")),
                span,
            )),
            None => Err(Error::at(
                ErrorKind::Parse("unexpected end of input".into()),
                Span::new(self.end, self.end),
            )),
        }
    }
}

fn binary(op: BinOp, left: Node, right: Node) -> Node {
    let span = left.span.join(right.span);
    Node::new(
        NodeKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

/// References used as call or assignment targets resolve to the binding
/// itself, never through the auto-call convention.
fn clear_auto_call(node: &mut Node) {
    match &mut node.kind {
        NodeKind::Symbol { auto_call, .. } | NodeKind::Select { auto_call, .. } => {
            *auto_call = false;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bindings_and_expressions() {
        let forms = parse("pub a = 10\npub b = a + 1\nassert b == 11").unwrap();
        assert_eq!(forms.len(), 3);
        assert!(matches!(forms[0].kind, NodeKind::Slot(_)));
        assert!(matches!(forms[2].kind, NodeKind::Assert(_)));
    }

    #[test]
    fn parses_zero_arg_function_sugar() {
        let forms = parse("pub f: Int! { 42 }").unwrap();
        match &forms[0].kind {
            NodeKind::Fun(fun) => {
                assert_eq!(fun.name, "f");
                assert!(fun.args.is_empty());
                assert!(matches!(fun.ret, Some(TypeNode::NonNull(_))));
            }
            other => panic!("expected a function, got {other:?}"),
        }
    }

    #[test]
    fn parses_class_with_method() {
        let forms =
            parse("type C {\n  pub v: Int!\n  pub incr: C! { self.v += 1\n self }\n}").unwrap();
        match &forms[0].kind {
            NodeKind::Class(class) => {
                assert_eq!(class.name, "C");
                assert_eq!(class.body.forms.len(), 2);
            }
            other => panic!("expected a class, got {other:?}"),
        }
    }

    #[test]
    fn call_targets_do_not_auto_call() {
        let forms = parse("f()").unwrap();
        match &forms[0].kind {
            NodeKind::Call { fun, .. } => match &fun.kind {
                NodeKind::Symbol { auto_call, .. } => assert!(!auto_call),
                other => panic!("expected a symbol, got {other:?}"),
            },
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn parses_directive_declaration() {
        let forms = parse(r#"directive @tag(name: String!) on OBJECT, FIELD"#).unwrap();
        match &forms[0].kind {
            NodeKind::Directive(decl) => {
                assert_eq!(decl.name, "tag");
                assert_eq!(decl.locations, vec!["OBJECT", "FIELD"]);
            }
            other => panic!("expected a directive, got {other:?}"),
        }
    }

    #[test]
    fn parses_null_coalescing() {
        let forms = parse("pub x = maybe ?? 0").unwrap();
        match &forms[0].kind {
            NodeKind::Slot(slot) => {
                assert!(matches!(
                    slot.value.as_deref().unwrap().kind,
                    NodeKind::Default { .. }
                ));
            }
            other => panic!("expected a slot, got {other:?}"),
        }
    }
}
