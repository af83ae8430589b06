#[cfg(test)]
mod tests {
    use starlift::runtime::{message, Context, Message, Value};
    use starlift::EtlError;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// A template that is exactly one expression keeps its native type.
    #[test]
    fn test_single_span_preserves_native_type() {
        init();
        let ctx = Context::new();
        let v = ctx.eval("${ 1 + 1 }", &Message::new(), "t").unwrap();
        assert_eq!(v, Value::Int(2));

        let v = ctx.eval("${ 1.5 * 2 }", &Message::new(), "t").unwrap();
        assert_eq!(v, Value::Float(3.0));

        let v = ctx.eval("${ true }", &Message::new(), "t").unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn test_surrounded_span_stringifies() {
        init();
        let ctx = Context::new();
        let v = ctx.eval("value=${ 1 + 1 }", &Message::new(), "t").unwrap();
        assert_eq!(v, Value::String("value=2".to_string()));
    }

    #[test]
    fn test_escaped_delimiter_also_evaluates() {
        init();
        let ctx = Context::new();
        let v = ctx.eval("$!{ 2 + 3 }", &Message::new(), "t").unwrap();
        assert_eq!(v, Value::Int(5));
    }

    #[test]
    fn test_plain_text_passes_through() {
        init();
        let ctx = Context::new();
        let v = ctx.eval("no expressions here", &Message::new(), "t").unwrap();
        assert_eq!(v, Value::String("no expressions here".to_string()));
    }

    #[test]
    fn test_message_scope() {
        init();
        let ctx = Context::new();
        let msg = message([("amount", 10i64)]);
        let v = ctx.eval("${ m.amount * 2 }", &msg, "t").unwrap();
        assert_eq!(v, Value::Int(20));
    }

    #[test]
    fn test_props_and_vars_scope() {
        init();
        let ctx = Context::new();
        ctx.set_prop("factor", 3i64);
        ctx.set_var("offset", 100i64);
        let v = ctx
            .eval("${ m.n * props.factor + var.offset }", &message([("n", 2i64)]), "t")
            .unwrap();
        assert_eq!(v, Value::Int(106));
    }

    #[test]
    fn test_lua_stdlib_available() {
        init();
        let ctx = Context::new();
        let v = ctx
            .eval("${ string.upper(m.code) }", &message([("code", "es")]), "t")
            .unwrap();
        assert_eq!(v, Value::String("ES".to_string()));
    }

    #[test]
    fn test_multiple_spans_in_one_template() {
        init();
        let ctx = Context::new();
        let msg = message([("a", 1i64), ("b", 2i64)]);
        let v = ctx.eval("${ m.a }-${ m.b }", &msg, "t").unwrap();
        assert_eq!(v, Value::String("1-2".to_string()));
    }

    #[test]
    fn test_table_constructor_inside_span() {
        init();
        let ctx = Context::new();
        let v = ctx.eval("${ {10, 20} }", &Message::new(), "t").unwrap();
        assert_eq!(v, Value::List(vec![Value::Int(10), Value::Int(20)]));
    }

    /// Evaluation failure names the component and carries the original
    /// expression text.
    #[test]
    fn test_error_carries_expression_and_component() {
        init();
        let ctx = Context::new();
        let err = ctx
            .eval("${ nosuch() }", &Message::new(), "filter.orders")
            .unwrap_err();
        match err {
            EtlError::Expr {
                expression,
                component,
                ..
            } => {
                assert!(expression.contains("nosuch"));
                assert_eq!(component, "filter.orders");
            }
            other => panic!("expected Expr error, got {}", other),
        }
    }

    #[test]
    fn test_syntax_error_surfaces() {
        init();
        let ctx = Context::new();
        assert!(ctx.eval("${ 1 + }", &Message::new(), "t").is_err());
    }

    #[test]
    fn test_null_round_trip() {
        init();
        let ctx = Context::new();
        let msg = message([("gone", Value::Null)]);
        let v = ctx.eval("${ m.gone }", &msg, "t").unwrap();
        assert_eq!(v, Value::Null);
    }
}
