use crate::entity::property_name;
use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{BinOp, Expr, ExprLit, ExprPath, Lit, UnOp};

/// A `Type::column` path names a column; anything else evaluates at runtime
/// and binds as a parameter.
fn column_of(expr: &Expr) -> Option<String> {
    let Expr::Path(ExprPath { path, .. }) = expr else {
        return None;
    };
    if path.segments.len() < 2 {
        return None;
    }
    Some(property_name(&path.segments.last().expect("checked").ident))
}

fn is_null_keyword(expr: &Expr) -> bool {
    matches!(expr, Expr::Path(ExprPath { path, .. })
        if path.is_ident("NULL"))
}

fn as_bound_value(expr: &Expr) -> TokenStream {
    quote! { ::gantry::AsValue::as_value(&(#expr)) }
}

fn compare(op: TokenStream, column: String, value: &Expr) -> TokenStream {
    let value = as_bound_value(value);
    quote! { ::gantry::Predicate::compare(#op, #column, #value) }
}

/// Translate Rust expression syntax into a `::gantry::Predicate`
/// constructor chain.
pub(crate) fn decode_predicate(expr: &Expr) -> TokenStream {
    match expr {
        Expr::Binary(binary) => {
            let lhs = binary.left.as_ref();
            let rhs = binary.right.as_ref();
            match binary.op {
                BinOp::And(..) => {
                    let (l, r) = (decode_predicate(lhs), decode_predicate(rhs));
                    quote! { #l.and(#r) }
                }
                BinOp::Or(..) => {
                    let (l, r) = (decode_predicate(lhs), decode_predicate(rhs));
                    quote! { #l.or(#r) }
                }
                BinOp::Eq(..) | BinOp::Ne(..) => {
                    let negated = matches!(binary.op, BinOp::Ne(..));
                    let op = if negated {
                        quote!(::gantry::CompareOp::Ne)
                    } else {
                        quote!(::gantry::CompareOp::Eq)
                    };
                    match (column_of(lhs), column_of(rhs)) {
                        (Some(column), _) if is_null_keyword(rhs) => {
                            if negated {
                                quote! { ::gantry::Predicate::is_not_null(#column) }
                            } else {
                                quote! { ::gantry::Predicate::is_null(#column) }
                            }
                        }
                        (_, Some(column)) if is_null_keyword(lhs) => {
                            if negated {
                                quote! { ::gantry::Predicate::is_not_null(#column) }
                            } else {
                                quote! { ::gantry::Predicate::is_null(#column) }
                            }
                        }
                        (Some(column), Some(other)) => {
                            quote! { ::gantry::Predicate::compare_columns(#op, #column, #other) }
                        }
                        (Some(column), None) => compare(op, column, rhs),
                        (None, Some(column)) => compare(op, column, lhs),
                        (None, None) => panic!(
                            "comparison `{}` references no column; columns are written Type::property",
                            expr.to_token_stream()
                        ),
                    }
                }
                BinOp::Lt(..) | BinOp::Le(..) | BinOp::Gt(..) | BinOp::Ge(..) => {
                    let op = match binary.op {
                        BinOp::Lt(..) => quote!(::gantry::CompareOp::Lt),
                        BinOp::Le(..) => quote!(::gantry::CompareOp::Le),
                        BinOp::Gt(..) => quote!(::gantry::CompareOp::Gt),
                        BinOp::Ge(..) => quote!(::gantry::CompareOp::Ge),
                        _ => unreachable!(),
                    };
                    let flipped = match binary.op {
                        BinOp::Lt(..) => quote!(::gantry::CompareOp::Gt),
                        BinOp::Le(..) => quote!(::gantry::CompareOp::Ge),
                        BinOp::Gt(..) => quote!(::gantry::CompareOp::Lt),
                        BinOp::Ge(..) => quote!(::gantry::CompareOp::Le),
                        _ => unreachable!(),
                    };
                    match (column_of(lhs), column_of(rhs)) {
                        (Some(column), Some(other)) => {
                            quote! { ::gantry::Predicate::compare_columns(#op, #column, #other) }
                        }
                        (Some(column), None) => compare(op, column, rhs),
                        (None, Some(column)) => compare(flipped, column, lhs),
                        (None, None) => panic!(
                            "comparison `{}` references no column; columns are written Type::property",
                            expr.to_token_stream()
                        ),
                    }
                }
                _ => panic!(
                    "unsupported operator in predicate `{}`",
                    expr.to_token_stream()
                ),
            }
        }
        Expr::Unary(unary) => match unary.op {
            UnOp::Not(..) => {
                let inner = decode_predicate(&unary.expr);
                quote! { #inner.not() }
            }
            _ => panic!(
                "unsupported unary operator in predicate `{}`",
                expr.to_token_stream()
            ),
        },
        Expr::MethodCall(call) => {
            let receiver = call.receiver.as_ref();
            let method = call.method.to_string();
            let args: Vec<&Expr> = call.args.iter().collect();
            if let Some(column) = column_of(receiver) {
                match (method.as_str(), args.as_slice()) {
                    ("starts_with", [pattern]) => {
                        let pattern = as_bound_value(pattern);
                        quote! { ::gantry::Predicate::starts_with(#column, #pattern) }
                    }
                    ("ends_with", [pattern]) => {
                        let pattern = as_bound_value(pattern);
                        quote! { ::gantry::Predicate::ends_with(#column, #pattern) }
                    }
                    ("contains", [pattern]) => {
                        let pattern = as_bound_value(pattern);
                        quote! { ::gantry::Predicate::contains(#column, #pattern) }
                    }
                    ("is_none" | "is_null", []) => {
                        quote! { ::gantry::Predicate::is_null(#column) }
                    }
                    ("is_some" | "is_not_null", []) => {
                        quote! { ::gantry::Predicate::is_not_null(#column) }
                    }
                    _ => panic!(
                        "unsupported method `{}` on column `{}`",
                        method, column
                    ),
                }
            } else if method == "contains" && args.len() == 1 {
                let Some(column) = column_of(args[0]) else {
                    panic!(
                        "`{}` tests membership of a non-column; the argument must be Type::property",
                        expr.to_token_stream()
                    );
                };
                let collection = as_bound_value(receiver);
                quote! { ::gantry::Predicate::in_list(#column, #collection) }
            } else {
                panic!(
                    "unsupported method call in predicate `{}`",
                    expr.to_token_stream()
                )
            }
        }
        Expr::Paren(paren) => decode_predicate(&paren.expr),
        Expr::Group(group) => decode_predicate(&group.expr),
        Expr::Lit(ExprLit {
            lit: Lit::Bool(v), ..
        }) => {
            let value = v.value;
            quote! { ::gantry::Predicate::literal(#value) }
        }
        expr => {
            if let Some(column) = column_of(expr) {
                // Bare boolean column as the whole predicate.
                quote! { ::gantry::Predicate::column(#column) }
            } else {
                // Pre-evaluated boolean expression.
                quote! { ::gantry::Predicate::literal(#expr) }
            }
        }
    }
}

/// Decode a `Type::column` path into its property-name literal.
pub(crate) fn decode_column(expr: &Expr) -> TokenStream {
    let Some(column) = column_of(expr) else {
        panic!(
            "`{}` is not a column; columns are written Type::property",
            expr.to_token_stream()
        );
    };
    quote! { #column }
}
