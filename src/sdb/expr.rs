use common::Word;
use emulator::Cpu;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Nesting beyond this many levels is rejected instead of recursing further.
pub const MAX_EVAL_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Plus,
    Minus,
    Star,
    Slash,
    Equal,
    NotEqual,
    And,
    LeftParen,
    RightParen,
    Register,
    Hex,
    Decimal,
    /// `-` in prefix position.
    Negate,
    /// `*` in prefix position.
    Deref,
}

impl TokenKind {
    fn is_operand_end(self) -> bool {
        matches!(
            self,
            TokenKind::Decimal | TokenKind::Hex | TokenKind::Register | TokenKind::RightParen
        )
    }

    /// Binding strength of a binary operator, loosest first.
    fn precedence(self) -> Option<usize> {
        match self {
            TokenKind::And => Some(0),
            TokenKind::Equal | TokenKind::NotEqual => Some(1),
            TokenKind::Plus | TokenKind::Minus => Some(2),
            TokenKind::Star | TokenKind::Slash => Some(3),
            _ => None,
        }
    }
}

const PRECEDENCE_LEVELS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the token in the expression.
    pub position: usize,
}

struct Rule {
    regex: Regex,
    /// `None` for whitespace, which is consumed without producing a token.
    kind: Option<TokenKind>,
}

// Tried in order at every position; the first rule that matches wins.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    [
        (r"\s+", None),
        (r"\+", Some(TokenKind::Plus)),
        (r"==", Some(TokenKind::Equal)),
        (r"!=", Some(TokenKind::NotEqual)),
        (r"&&", Some(TokenKind::And)),
        (r"\$[0-9a-z]+", Some(TokenKind::Register)),
        (r"0[xX][0-9a-fA-F]+", Some(TokenKind::Hex)),
        (r"[0-9]+", Some(TokenKind::Decimal)),
        (r"-", Some(TokenKind::Minus)),
        (r"/", Some(TokenKind::Slash)),
        (r"\*", Some(TokenKind::Star)),
        (r"\(", Some(TokenKind::LeftParen)),
        (r"\)", Some(TokenKind::RightParen)),
    ]
    .into_iter()
    .map(|(pattern, kind)| Rule {
        regex: Regex::new(&format!("^(?:{pattern})")).expect("token rules are valid regexes"),
        kind,
    })
    .collect()
});

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ExprError {
    /// returned when no token rule matches at `position`
    #[error("syntax error at position {position}")]
    Syntax { position: usize },

    /// returned for an expression without tokens
    #[error("empty expression")]
    Empty,

    #[error("unmatched parenthesis")]
    UnmatchedParenthesis,

    /// returned when an operator has nothing on one of its sides
    #[error("missing operand")]
    MissingOperand,

    /// returned for a numeric literal that does not fit in a word
    #[error("invalid number `{0}`")]
    InvalidLiteral(String),

    #[error("unknown register `${0}`")]
    UnknownRegister(String),

    #[error("division by zero")]
    DivideByZero,

    /// returned when a dereference falls outside of guest memory
    #[error("cannot access memory at address {0:#010x}")]
    Memory(Word),

    #[error("expression is nested deeper than {} levels", MAX_EVAL_DEPTH)]
    TooDeep,
}

/// Machine state an expression can refer to.
pub trait EvalContext {
    /// Value of the register called `name` (without the leading `$`).
    fn register(&self, name: &str) -> Option<Word>;

    /// The word stored at `address`.
    fn read_word(&self, address: Word) -> Option<Word>;
}

impl EvalContext for Cpu {
    fn register(&self, name: &str) -> Option<Word> {
        self.resolve_register(name)
    }

    fn read_word(&self, address: Word) -> Option<Word> {
        self.get_mmu().load_word(address).ok()
    }
}

/// Splits `input` into tokens, then marks every `-` and `*` that does not
/// follow an operand as unary.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ExprError> {
    let mut tokens = Vec::new();
    let mut position = 0;
    while position < input.len() {
        let rest = &input[position..];
        let (rule, len) = RULES
            .iter()
            .find_map(|rule| rule.regex.find(rest).map(|m| (rule, m.end())))
            .ok_or(ExprError::Syntax { position })?;
        tracing::debug!(
            "match rule \"{}\" at position {position} with len {len}: {}",
            rule.regex.as_str(),
            &rest[..len]
        );
        if let Some(kind) = rule.kind {
            tokens.push(Token {
                kind,
                text: &rest[..len],
                position,
            });
        }
        position += len;
    }

    for i in 0..tokens.len() {
        let after_operand = i > 0 && tokens[i - 1].kind.is_operand_end();
        if after_operand {
            continue;
        }
        tokens[i].kind = match tokens[i].kind {
            TokenKind::Minus => TokenKind::Negate,
            TokenKind::Star => TokenKind::Deref,
            kind => kind,
        };
    }
    Ok(tokens)
}

/// Evaluates `input` against `ctx`. Arithmetic wraps at the word width and
/// is unsigned; comparisons and `&&` produce 0 or 1.
pub fn evaluate(input: &str, ctx: &dyn EvalContext) -> Result<Word, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    eval(&tokens, ctx, 0)
}

fn eval(tokens: &[Token], ctx: &dyn EvalContext, depth: usize) -> Result<Word, ExprError> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(ExprError::TooDeep);
    }
    match tokens {
        [] => Err(ExprError::MissingOperand),
        [token] => operand(token, ctx),
        _ if is_parenthesized(tokens) => eval(&tokens[1..tokens.len() - 1], ctx, depth + 1),
        _ => match split_point(tokens)? {
            Some(split) => {
                let left = eval(&tokens[..split], ctx, depth + 1)?;
                let right = eval(&tokens[split + 1..], ctx, depth + 1)?;
                apply(tokens[split].kind, left, right)
            }
            None => {
                let value = || eval(&tokens[1..], ctx, depth + 1);
                match tokens[0].kind {
                    TokenKind::Negate => Ok(value()?.wrapping_neg()),
                    TokenKind::Deref => {
                        let address = value()?;
                        ctx.read_word(address).ok_or(ExprError::Memory(address))
                    }
                    _ => Err(unexpected_token(tokens)),
                }
            }
        },
    }
}

fn operand(token: &Token, ctx: &dyn EvalContext) -> Result<Word, ExprError> {
    let invalid = || ExprError::InvalidLiteral(token.text.to_string());
    match token.kind {
        TokenKind::Decimal => token.text.parse::<Word>().map_err(|_| invalid()),
        TokenKind::Hex => Word::from_str_radix(&token.text[2..], 16).map_err(|_| invalid()),
        TokenKind::Register => {
            let name = &token.text[1..];
            ctx.register(name)
                .ok_or_else(|| ExprError::UnknownRegister(name.to_string()))
        }
        _ => Err(ExprError::MissingOperand),
    }
}

/// True if the first token is an opening parenthesis whose match is the
/// last token.
fn is_parenthesized(tokens: &[Token]) -> bool {
    let last = tokens.len() - 1;
    if tokens[0].kind != TokenKind::LeftParen || tokens[last].kind != TokenKind::RightParen {
        return false;
    }
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == last;
                }
            }
            _ => {}
        }
    }
    false
}

/// Finds the operator to evaluate last: the rightmost top-level operator of
/// the loosest precedence present. Splitting at the rightmost one makes
/// operators of equal precedence associate to the left.
fn split_point(tokens: &[Token]) -> Result<Option<usize>, ExprError> {
    let mut rightmost = [None; PRECEDENCE_LEVELS];
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().rev() {
        match token.kind {
            TokenKind::RightParen => depth += 1,
            TokenKind::LeftParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(ExprError::UnmatchedParenthesis)?;
            }
            kind if depth == 0 => {
                if let Some(level) = kind.precedence() {
                    rightmost[level].get_or_insert(i);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ExprError::UnmatchedParenthesis);
    }
    Ok(rightmost.into_iter().flatten().next())
}

/// Two operands with no operator between them. Reports the start of the
/// second one.
fn unexpected_token(tokens: &[Token]) -> ExprError {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth == 0 {
            if let Some(next) = tokens.get(i + 1) {
                return ExprError::Syntax {
                    position: next.position,
                };
            }
        }
    }
    ExprError::Syntax {
        position: tokens[0].position,
    }
}

fn apply(operator: TokenKind, left: Word, right: Word) -> Result<Word, ExprError> {
    Ok(match operator {
        TokenKind::Plus => left.wrapping_add(right),
        TokenKind::Minus => left.wrapping_sub(right),
        TokenKind::Star => left.wrapping_mul(right),
        TokenKind::Slash => left.checked_div(right).ok_or(ExprError::DivideByZero)?,
        TokenKind::Equal => (left == right) as Word,
        TokenKind::NotEqual => (left != right) as Word,
        TokenKind::And => (left != 0 && right != 0) as Word,
        _ => return Err(ExprError::MissingOperand),
    })
}
