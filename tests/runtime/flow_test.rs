#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use starlift::runtime::{
        message, Chain, Component, Context, Filter, Message, Multiplier, Node, SetFields, Union,
        Value, ValuesSource,
    };
    use starlift::EtlError;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn node(n: impl Node + 'static) -> Rc<dyn Node> {
        Rc::new(n)
    }

    /// A chain feeds each step's outputs into the next step.
    #[test]
    fn test_chain_threads_outputs_through_steps() {
        init();
        let chain = Chain::new(
            "c",
            vec![
                node(SetFields::new("set_b", vec![("b".into(), "${ m.a + 1 }".into())])),
                node(SetFields::new("set_c", vec![("c".into(), "${ m.b * 10 }".into())])),
            ],
        );
        let ctx = Context::new();
        ctx.initialize(&chain).unwrap();
        let out = ctx.run(&chain, message([("a", 1i64)])).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("b"), Some(&Value::Int(2)));
        assert_eq!(out[0].get("c"), Some(&Value::Int(20)));
    }

    /// A fork chain yields exactly one copy of its input regardless of
    /// what the inner branch produces.
    #[test]
    fn test_fork_yields_single_copy_of_input() {
        init();
        let fanout = Multiplier::new(
            "fan",
            "i",
            ValuesSource::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        );
        let chain = Chain::new("branch", vec![node(fanout)]).with_fork(true);
        let ctx = Context::new();
        ctx.initialize(&chain).unwrap();

        let input = message([("a", 1i64)]);
        let out = ctx.run(&chain, input.clone()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], input);
    }

    #[test]
    fn test_fork_surfaces_branch_errors() {
        init();
        let broken = Filter::new("broken", "${ nosuch.fn() }");
        let chain = Chain::new("branch", vec![node(broken)]).with_fork(true);
        let ctx = Context::new();
        ctx.initialize(&chain).unwrap();
        assert!(ctx.run(&chain, message([("a", 1i64)])).is_err());
    }

    #[test]
    fn test_filter_drops_and_passes() {
        init();
        let filter = Filter::new("only_big", "${ m.n > 10 }");
        let ctx = Context::new();
        ctx.initialize(&filter).unwrap();

        let out = ctx.run(&filter, message([("n", 42i64)])).unwrap();
        assert_eq!(out.len(), 1);
        let out = ctx.run(&filter, message([("n", 3i64)])).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_multiplier_from_csv() {
        init();
        let mult = Multiplier::new("m", "country", ValuesSource::Csv("es, fr ,de".into()));
        let ctx = Context::new();
        ctx.initialize(&mult).unwrap();
        let out = ctx.run(&mult, Message::new()).unwrap();
        let values: Vec<&str> = out
            .iter()
            .map(|m| m.get("country").unwrap().as_str().unwrap())
            .collect();
        assert_eq!(values, vec!["es", "fr", "de"]);
    }

    #[test]
    fn test_multiplier_from_expression() {
        init();
        let mult = Multiplier::new("m", "i", ValuesSource::Expr("${ {1, 2, 3} }".into()));
        let ctx = Context::new();
        ctx.initialize(&mult).unwrap();
        let out = ctx.run(&mult, message([("keep", "yes")])).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].get("i"), Some(&Value::Int(3)));
        // each copy keeps the original fields
        assert_eq!(out[0].get("keep"), Some(&Value::String("yes".into())));
    }

    #[test]
    fn test_multiplier_scalar_expression_yields_one() {
        init();
        let mult = Multiplier::new("m", "i", ValuesSource::Expr("${ 7 }".into()));
        let ctx = Context::new();
        ctx.initialize(&mult).unwrap();
        let out = ctx.run(&mult, Message::new()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("i"), Some(&Value::Int(7)));
    }

    /// Union concatenates branch outputs; fork discards them.
    #[test]
    fn test_union_concatenates_branches() {
        init();
        let union = Union::new(
            "u",
            vec![
                node(SetFields::new("left", vec![("side".into(), "left".into())])),
                node(SetFields::new("right", vec![("side".into(), "right".into())])),
            ],
        );
        let ctx = Context::new();
        ctx.initialize(&union).unwrap();
        let out = ctx.run(&union, message([("a", 1i64)])).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("side"), Some(&Value::String("left".into())));
        assert_eq!(out[1].get("side"), Some(&Value::String("right".into())));
        assert_eq!(out[1].get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_chain_initializes_children_once() {
        init();
        let shared = node(SetFields::new("shared", vec![("x".into(), "1".into())]));
        let chain = Chain::new("c", vec![shared.clone(), shared.clone()]);
        let ctx = Context::new();
        // Initializing twice through two references must not error.
        ctx.initialize(&chain).unwrap();
        ctx.initialize(&chain).unwrap();
        let out = ctx.run(&chain, Message::new()).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_process_outside_lifecycle_window_is_fatal() {
        init();
        let filter = Filter::new("f", "${ true }");
        let ctx = Context::new();
        let err = ctx.run(&filter, Message::new()).unwrap_err();
        assert!(matches!(err, EtlError::Lifecycle { .. }));

        ctx.initialize(&filter).unwrap();
        ctx.finalize(&filter).unwrap();
        let err = ctx.run(&filter, Message::new()).unwrap_err();
        assert!(matches!(err, EtlError::Lifecycle { .. }));
    }
}
