/// Scalar function registry
///
/// Maps host-language math/utility calls (category `CustomExtension`) to SQL
/// functions, with optional argument transformations. Consulted through the
/// pluggable [`FunctionVisitor`] list; the registry's own visitor is always
/// registered first.
use std::collections::HashMap;

use super::errors::{TranslateError, TranslateResult};
use crate::dialect::DialectSettings;
use crate::expression::{Category, MethodCall};

/// A custom-function translator.
///
/// `args` are the already rendered SQL arguments, receiver first. Returning
/// `None` passes the call on to the next visitor in registration order.
pub trait FunctionVisitor: Send + Sync {
    fn visit(
        &self,
        call: &MethodCall,
        args: &[String],
        dialect: &DialectSettings,
    ) -> Option<TranslateResult<String>>;
}

/// Function mapping entry
#[derive(Clone)]
pub struct FunctionMapping {
    /// Host function name
    #[allow(dead_code)]
    pub name: &'static str,
    /// SQL function name
    pub sql_name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    /// Spelled without parentheses (`CURRENT_TIMESTAMP`)
    pub niladic: bool,
    /// Optional argument transformation
    /// Takes SQL string args, returns transformed SQL string args
    pub arg_transform: Option<fn(&[String]) -> Vec<String>>,
}

impl FunctionMapping {
    fn render(&self, args: &[String]) -> String {
        if self.niladic {
            return self.sql_name.to_string();
        }
        let args = match self.arg_transform {
            Some(transform) => transform(args),
            None => args.to_vec(),
        };
        format!("{}({})", self.sql_name, args.join(", "))
    }
}

/// Get function mapping for a host function name
pub fn get_function_mapping(name: &str) -> Option<FunctionMapping> {
    let lower = name.to_lowercase();
    FUNCTION_MAPPINGS.get(lower.as_str()).cloned()
}

// Static function mapping table
lazy_static::lazy_static! {
    static ref FUNCTION_MAPPINGS: HashMap<&'static str, FunctionMapping> = {
        let mut m = HashMap::new();

        // ===== MATH FUNCTIONS =====

        m.insert("abs", FunctionMapping {
            name: "Abs",
            sql_name: "ABS",
            min_args: 1,
            max_args: 1,
            niladic: false,
            arg_transform: None,
        });

        m.insert("ceiling", FunctionMapping {
            name: "Ceiling",
            sql_name: "CEILING",
            min_args: 1,
            max_args: 1,
            niladic: false,
            arg_transform: None,
        });

        m.insert("floor", FunctionMapping {
            name: "Floor",
            sql_name: "FLOOR",
            min_args: 1,
            max_args: 1,
            niladic: false,
            arg_transform: None,
        });

        // Round(x) -> ROUND(x, 0); not every engine defaults the precision
        m.insert("round", FunctionMapping {
            name: "Round",
            sql_name: "ROUND",
            min_args: 1,
            max_args: 2,
            niladic: false,
            arg_transform: Some(|args| {
                if args.len() == 1 {
                    vec![args[0].clone(), "0".to_string()]
                } else {
                    args.to_vec()
                }
            }),
        });

        m.insert("power", FunctionMapping {
            name: "Power",
            sql_name: "POWER",
            min_args: 2,
            max_args: 2,
            niladic: false,
            arg_transform: None,
        });

        m.insert("sqrt", FunctionMapping {
            name: "Sqrt",
            sql_name: "SQRT",
            min_args: 1,
            max_args: 1,
            niladic: false,
            arg_transform: None,
        });

        m.insert("sign", FunctionMapping {
            name: "Sign",
            sql_name: "SIGN",
            min_args: 1,
            max_args: 1,
            niladic: false,
            arg_transform: None,
        });

        // ===== UTILITY FUNCTIONS =====

        m.insert("coalesce", FunctionMapping {
            name: "Coalesce",
            sql_name: "COALESCE",
            min_args: 1,
            max_args: usize::MAX,
            niladic: false,
            arg_transform: None,
        });

        m.insert("now", FunctionMapping {
            name: "Now",
            sql_name: "CURRENT_TIMESTAMP",
            min_args: 0,
            max_args: 0,
            niladic: true,
            arg_transform: None,
        });

        m
    };
}

/// The built-in [`FunctionVisitor`] backed by the mapping table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarFunctionVisitor;

impl FunctionVisitor for ScalarFunctionVisitor {
    fn visit(
        &self,
        call: &MethodCall,
        args: &[String],
        _dialect: &DialectSettings,
    ) -> Option<TranslateResult<String>> {
        if call.category != Category::CustomExtension {
            return None;
        }
        let mapping = get_function_mapping(&call.name)?;
        if args.len() < mapping.min_args || args.len() > mapping.max_args {
            return Some(Err(TranslateError::unsupported(format!(
                "{} called with {} argument(s)",
                call.name,
                args.len()
            ))));
        }
        log::debug!("function {} -> {}", call.name, mapping.sql_name);
        Some(Ok(mapping.render(args)))
    }
}
