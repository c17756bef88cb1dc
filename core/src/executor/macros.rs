//! Macro expansion
//!
//! A pure AST to AST pass run over a whole module before anything is
//! registered. A single traversal ([`rewrite_stmts`] / [`rewrite_expr`])
//! rebuilds the tree and calls back into a [`Rewriter`] at each node; the
//! two rewriters are parameter substitution and invocation expansion.
//!
//! Expansion depth is bounded: every nested invocation counts one level and
//! the ceiling comes from `Limits::max_macro_depth`.

use std::collections::HashMap;

use super::errors::RuntimeError;
use super::types::{
    Expr, Field, FieldPattern, Item, LambdaBody, MacroDef, MatchCase, MemberAccess, Module,
    Pattern, Stmt, SwitchCase,
};

/// What a rewriter wants done with a node
enum Visit<T> {
    /// Use as is, do not visit its children
    Done(T),
    /// Keep rewriting inside
    Descend(T),
}

trait Rewriter {
    fn expr(&mut self, expr: Expr) -> Result<Visit<Expr>, RuntimeError> {
        Ok(Visit::Descend(expr))
    }

    /// Replace one statement with a sequence
    fn splice(&mut self, _stmt: &Stmt) -> Result<Option<Vec<Stmt>>, RuntimeError> {
        Ok(None)
    }

    /// Names introduced by declarations, assignments and patterns
    fn binding(&mut self, name: String) -> String {
        name
    }
}

fn rewrite_stmts<R: Rewriter>(r: &mut R, stmts: Vec<Stmt>) -> Result<Vec<Stmt>, RuntimeError> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match r.splice(&stmt)? {
            Some(replacement) => out.extend(replacement),
            None => out.push(rewrite_stmt(r, stmt)?),
        }
    }
    Ok(out)
}

fn rewrite_opt_stmts<R: Rewriter>(
    r: &mut R,
    stmts: Option<Vec<Stmt>>,
) -> Result<Option<Vec<Stmt>>, RuntimeError> {
    stmts.map(|s| rewrite_stmts(r, s)).transpose()
}

fn rewrite_opt_expr<R: Rewriter>(r: &mut R, expr: Option<Expr>) -> Result<Option<Expr>, RuntimeError> {
    expr.map(|e| rewrite_expr(r, e)).transpose()
}

fn rewrite_exprs<R: Rewriter>(r: &mut R, exprs: Vec<Expr>) -> Result<Vec<Expr>, RuntimeError> {
    exprs.into_iter().map(|e| rewrite_expr(r, e)).collect()
}

fn rewrite_box<R: Rewriter>(r: &mut R, expr: Box<Expr>) -> Result<Box<Expr>, RuntimeError> {
    rewrite_expr(r, *expr).map(Box::new)
}

fn rewrite_fields<R: Rewriter>(r: &mut R, fields: Vec<Field>) -> Result<Vec<Field>, RuntimeError> {
    fields
        .into_iter()
        .map(|field| -> Result<Field, RuntimeError> {
            Ok(Field {
                default: rewrite_opt_expr(r, field.default)?,
                ..field
            })
        })
        .collect()
}

fn rewrite_stmt<R: Rewriter>(r: &mut R, stmt: Stmt) -> Result<Stmt, RuntimeError> {
    Ok(match stmt {
        Stmt::Declare {
            var_kind,
            name,
            ty,
            init,
        } => Stmt::Declare {
            var_kind,
            name: r.binding(name),
            ty,
            init: rewrite_expr(r, init)?,
        },
        Stmt::Assign { var, path, value } => Stmt::Assign {
            var: r.binding(var),
            path: path
                .into_iter()
                .map(|segment| -> Result<MemberAccess, RuntimeError> {
                    match segment {
                        MemberAccess::Index { expr } => Ok(MemberAccess::Index {
                            expr: rewrite_expr(r, expr)?,
                        }),
                        prop => Ok(prop),
                    }
                })
                .collect::<Result<_, RuntimeError>>()?,
            value: rewrite_expr(r, value)?,
        },
        Stmt::Expr { expr } => Stmt::Expr {
            expr: rewrite_expr(r, expr)?,
        },
        Stmt::Return { value } => Stmt::Return {
            value: rewrite_opt_expr(r, value)?,
        },
        Stmt::If {
            test,
            then_s,
            else_s,
        } => Stmt::If {
            test: rewrite_expr(r, test)?,
            then_s: rewrite_stmts(r, then_s)?,
            else_s: rewrite_opt_stmts(r, else_s)?,
        },
        Stmt::While { test, body } => Stmt::While {
            test: rewrite_expr(r, test)?,
            body: rewrite_stmts(r, body)?,
        },
        Stmt::For {
            key,
            value,
            iterable,
            body,
        } => Stmt::For {
            key: key.map(|k| r.binding(k)),
            value: r.binding(value),
            iterable: rewrite_expr(r, iterable)?,
            body: rewrite_stmts(r, body)?,
        },
        Stmt::Switch {
            value,
            cases,
            default,
        } => Stmt::Switch {
            value: rewrite_expr(r, value)?,
            cases: cases
                .into_iter()
                .map(|case| -> Result<SwitchCase, RuntimeError> {
                    Ok(SwitchCase {
                        value: rewrite_expr(r, case.value)?,
                        body: rewrite_stmts(r, case.body)?,
                    })
                })
                .collect::<Result<_, RuntimeError>>()?,
            default: rewrite_opt_stmts(r, default)?,
        },
        Stmt::Assert { test, message } => Stmt::Assert {
            test: rewrite_expr(r, test)?,
            message: rewrite_opt_expr(r, message)?,
        },
        Stmt::Validate { call } => Stmt::Validate {
            call: rewrite_expr(r, call)?,
        },
        Stmt::Yield { value, event_type } => Stmt::Yield {
            value: rewrite_expr(r, value)?,
            event_type,
        },
        Stmt::Macro { name, args } => Stmt::Macro {
            name,
            args: rewrite_exprs(r, args)?,
        },
        leaf @ (Stmt::Break | Stmt::Continue) => leaf,
    })
}

fn rewrite_expr<R: Rewriter>(r: &mut R, expr: Expr) -> Result<Expr, RuntimeError> {
    let expr = match r.expr(expr)? {
        Visit::Done(expr) => return Ok(expr),
        Visit::Descend(expr) => expr,
    };
    Ok(match expr {
        Expr::LitList { elements } => Expr::LitList {
            elements: rewrite_exprs(r, elements)?,
        },
        Expr::LitObj { properties } => Expr::LitObj {
            properties: properties
                .into_iter()
                .map(|(key, value)| -> Result<(String, Expr), RuntimeError> {
                    Ok((key, rewrite_expr(r, value)?))
                })
                .collect::<Result<_, RuntimeError>>()?,
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: rewrite_box(r, left)?,
            right: rewrite_box(r, right)?,
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op,
            operand: rewrite_box(r, operand)?,
        },
        Expr::Member {
            object,
            property,
            optional,
        } => Expr::Member {
            object: rewrite_box(r, object)?,
            property,
            optional,
        },
        Expr::Index { object, index } => Expr::Index {
            object: rewrite_box(r, object)?,
            index: rewrite_box(r, index)?,
        },
        Expr::Call {
            callee,
            type_args,
            args,
        } => Expr::Call {
            callee: rewrite_box(r, callee)?,
            type_args,
            args: rewrite_exprs(r, args)?,
        },
        Expr::Lambda { params, body } => Expr::Lambda {
            params: rewrite_fields(r, params)?,
            body: match body {
                LambdaBody::Expr { expr } => LambdaBody::Expr {
                    expr: rewrite_box(r, expr)?,
                },
                LambdaBody::Block { body } => LambdaBody::Block {
                    body: rewrite_stmts(r, body)?,
                },
            },
        },
        Expr::Match { value, cases } => Expr::Match {
            value: rewrite_box(r, value)?,
            cases: cases
                .into_iter()
                .map(|case| -> Result<MatchCase, RuntimeError> {
                    Ok(MatchCase {
                        pattern: rewrite_pattern(r, case.pattern)?,
                        guard: rewrite_opt_expr(r, case.guard)?,
                        body: rewrite_expr(r, case.body)?,
                    })
                })
                .collect::<Result<_, RuntimeError>>()?,
        },
        Expr::Async { body } => Expr::Async {
            body: rewrite_stmts(r, body)?,
        },
        Expr::Await { inner } => Expr::Await {
            inner: rewrite_box(r, inner)?,
        },
        Expr::Pipe { left, right } => Expr::Pipe {
            left: rewrite_box(r, left)?,
            right: rewrite_box(r, right)?,
        },
        Expr::Macro { name, args } => Expr::Macro {
            name,
            args: rewrite_exprs(r, args)?,
        },
        leaf => leaf,
    })
}

fn rewrite_pattern<R: Rewriter>(r: &mut R, pattern: Pattern) -> Result<Pattern, RuntimeError> {
    Ok(match pattern {
        Pattern::Literal { value } => Pattern::Literal {
            value: rewrite_expr(r, value)?,
        },
        Pattern::Var { name } => Pattern::Var {
            name: r.binding(name),
        },
        Pattern::Object { fields } => Pattern::Object {
            fields: fields
                .into_iter()
                .map(|field| -> Result<FieldPattern, RuntimeError> {
                    Ok(FieldPattern {
                        key: field.key,
                        pattern: field.pattern.map(|p| rewrite_pattern(r, p)).transpose()?,
                    })
                })
                .collect::<Result<_, RuntimeError>>()?,
        },
        Pattern::Array { elements, rest } => Pattern::Array {
            elements: elements
                .into_iter()
                .map(|p| rewrite_pattern(r, p))
                .collect::<Result<_, RuntimeError>>()?,
            rest: rest.map(|name| r.binding(name)),
        },
        Pattern::Ok { inner } => Pattern::Ok {
            inner: Box::new(rewrite_pattern(r, *inner)?),
        },
        Pattern::Err { inner } => Pattern::Err {
            inner: Box::new(rewrite_pattern(r, *inner)?),
        },
        Pattern::Wildcard => Pattern::Wildcard,
    })
}

/* ===================== Substitution ===================== */

/// Replace macro parameters with the caller's argument expressions
struct Substitute<'a> {
    subs: HashMap<&'a str, &'a Expr>,
}

impl Substitute<'_> {
    /// `${param}` interpolation. Only literals and identifiers interpolate.
    fn interpolate(&self, s: &str) -> String {
        let mut result = s.to_string();
        for (param, expr) in &self.subs {
            let placeholder = format!("${{{}}}", param);
            if !result.contains(&placeholder) {
                continue;
            }
            let text = match expr {
                Expr::LitStr { v } => v.clone(),
                Expr::LitInt { v } => v.to_string(),
                Expr::LitFloat { v } => v.to_string(),
                Expr::LitBool { v } => v.to_string(),
                Expr::Ident { name } => name.clone(),
                _ => continue,
            };
            result = result.replace(&placeholder, &text);
        }
        result
    }
}

impl Rewriter for Substitute<'_> {
    fn expr(&mut self, expr: Expr) -> Result<Visit<Expr>, RuntimeError> {
        Ok(match expr {
            Expr::Ident { name } => match self.subs.get(name.as_str()) {
                Some(arg) => Visit::Done((*arg).clone()),
                None => Visit::Done(Expr::Ident { name }),
            },
            Expr::LitStr { v } => Visit::Done(Expr::LitStr {
                v: self.interpolate(&v),
            }),
            other => Visit::Descend(other),
        })
    }

    fn binding(&mut self, name: String) -> String {
        match self.subs.get(name.as_str()) {
            Some(Expr::Ident { name: renamed }) => renamed.clone(),
            _ => self.interpolate(&name),
        }
    }
}

/* ===================== Expansion ===================== */

struct Expand<'a> {
    macros: &'a HashMap<String, MacroDef>,
    depth: usize,
    max_depth: usize,
}

impl Expand<'_> {
    /// Fully expanded statements for one invocation
    fn invoke(&self, name: &str, args: &[Expr]) -> Result<Vec<Stmt>, RuntimeError> {
        if self.depth >= self.max_depth {
            return Err(RuntimeError::Macro(format!(
                "macro expansion depth limit exceeded ({}) while expanding {:?}",
                self.max_depth, name
            )));
        }
        let def = self
            .macros
            .get(name)
            .ok_or_else(|| RuntimeError::Macro(format!("undefined macro: {}", name)))?;
        if def.params.len() != args.len() {
            return Err(RuntimeError::Macro(format!(
                "macro {} expects {} arguments, got {}",
                name,
                def.params.len(),
                args.len()
            )));
        }

        let mut substitute = Substitute {
            subs: def.params.iter().map(String::as_str).zip(args).collect(),
        };
        let body = rewrite_stmts(&mut substitute, def.body.clone())?;

        let mut nested = Expand {
            macros: self.macros,
            depth: self.depth + 1,
            max_depth: self.max_depth,
        };
        rewrite_stmts(&mut nested, body)
    }
}

impl Rewriter for Expand<'_> {
    fn expr(&mut self, expr: Expr) -> Result<Visit<Expr>, RuntimeError> {
        let Expr::Macro { name, args } = expr else {
            return Ok(Visit::Descend(expr));
        };
        let mut stmts = self.invoke(&name, &args)?;
        match (stmts.pop(), stmts.is_empty()) {
            (Some(Stmt::Expr { expr }), true) => Ok(Visit::Done(expr)),
            (last, _) => Err(RuntimeError::Macro(format!(
                "macro {} used as an expression must expand to exactly one expression, got {} statements",
                name,
                stmts.len() + usize::from(last.is_some())
            ))),
        }
    }

    fn splice(&mut self, stmt: &Stmt) -> Result<Option<Vec<Stmt>>, RuntimeError> {
        match stmt {
            Stmt::Macro { name, args } => self.invoke(name, args).map(Some),
            _ => Ok(None),
        }
    }
}

/// Expand every macro invocation in `module`. Macro definitions are removed
/// from the result.
pub fn expand_module(module: Module, max_depth: usize) -> Result<Module, RuntimeError> {
    let mut macros = HashMap::new();
    let mut rest = Vec::with_capacity(module.items.len());
    for item in module.items {
        match item {
            Item::Macro(def) => {
                macros.insert(def.name.clone(), def);
            }
            other => rest.push(other),
        }
    }

    let mut expand = Expand {
        macros: &macros,
        depth: 0,
        max_depth,
    };
    let items = rest
        .into_iter()
        .map(|item| expand_item(&mut expand, item))
        .collect::<Result<_, _>>()?;
    Ok(Module { items })
}

fn expand_item(expand: &mut Expand<'_>, item: Item) -> Result<Item, RuntimeError> {
    Ok(match item {
        Item::Function(mut f) => {
            f.params = rewrite_fields(expand, f.params)?;
            f.body = rewrite_stmts(expand, f.body)?;
            Item::Function(f)
        }
        Item::TypeDef(mut def) => {
            def.fields = rewrite_fields(expand, def.fields)?;
            for method in &mut def.methods {
                method.body = rewrite_stmts(expand, std::mem::take(&mut method.body))?;
            }
            Item::TypeDef(def)
        }
        Item::Route(mut route) => {
            route.body = rewrite_stmts(expand, route.body)?;
            Item::Route(route)
        }
        Item::Command(mut cmd) => {
            cmd.params = rewrite_fields(expand, cmd.params)?;
            cmd.body = rewrite_stmts(expand, cmd.body)?;
            Item::Command(cmd)
        }
        Item::Cron(mut task) => {
            task.body = rewrite_stmts(expand, task.body)?;
            Item::Cron(task)
        }
        Item::Event(mut handler) => {
            handler.body = rewrite_stmts(expand, handler.body)?;
            Item::Event(handler)
        }
        Item::Queue(mut worker) => {
            worker.body = rewrite_stmts(expand, worker.body)?;
            Item::Queue(worker)
        }
        Item::Test(mut test) => {
            test.body = rewrite_stmts(expand, test.body)?;
            Item::Test(test)
        }
        Item::Const(mut decl) => {
            decl.value = rewrite_expr(expand, decl.value)?;
            Item::Const(decl)
        }
        other @ (Item::Trait(_) | Item::Macro(_)) => other,
    })
}
