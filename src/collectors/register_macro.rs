macro_rules! register_collectors {
    (
        $(
            $module:ident => $collector_type:ident
        ),* $(,)?
    ) => {
        // Import all collector modules
        $(
            pub mod $module;
            pub use $module::$collector_type;
        )*

        // Generate the enum with all collector types
        #[derive(Clone)]
        pub enum CollectorType {
            $(
                $collector_type($collector_type),
            )*
        }

        // Implement Collector trait for CollectorType enum
        impl Collector for CollectorType {
            fn name(&self) -> &'static str {
                match self {
                    $(
                        CollectorType::$collector_type(c) => c.name(),
                    )*
                }
            }

            fn gauge(&self) -> &GaugeFamily {
                match self {
                    $(
                        CollectorType::$collector_type(c) => c.gauge(),
                    )*
                }
            }

            fn requires(&self) -> Option<Extension> {
                match self {
                    $(
                        CollectorType::$collector_type(c) => c.requires(),
                    )*
                }
            }

            fn register_metrics(&self, registry: &Registry) -> Result<()> {
                match self {
                    $(
                        CollectorType::$collector_type(c) => c.register_metrics(registry),
                    )*
                }
            }

            fn collect<'a>(
                &'a self,
                ctx: &'a PollContext,
            ) -> BoxFuture<'a, Result<Vec<Sample>, QueryError>> {
                match self {
                    $(
                        CollectorType::$collector_type(c) => c.collect(ctx),
                    )*
                }
            }

            fn enabled_by_default(&self) -> bool {
                match self {
                    $(
                        CollectorType::$collector_type(c) => c.enabled_by_default(),
                    )*
                }
            }
        }

        /// Factory building a family from the engine configuration.
        ///
        /// Construction fails only on invalid metric names or labels, which
        /// come from user-provided namespace and constant labels.
        pub type CollectorFactory = fn(&GaugesConfig) -> Result<CollectorType>;

        // Generate the factory function map
        pub fn all_factories() -> HashMap<&'static str, CollectorFactory> {
            let mut map: HashMap<&'static str, CollectorFactory> = HashMap::new();
            $(
                map.insert(
                    stringify!($module),
                    |config: &GaugesConfig| Ok(CollectorType::$collector_type($collector_type::new(config)?)),
                );
            )*
            map
        }

        /// Whether the named family polls unless explicitly disabled.
        #[must_use]
        pub fn enabled_by_default(name: &str) -> bool {
            all_factories()
                .get(name)
                .and_then(|factory| factory(&GaugesConfig::default()).ok())
                .is_some_and(|collector| collector.enabled_by_default())
        }

        // Generate array of collector names
        pub const COLLECTOR_NAMES: &[&'static str] = &[
            $(stringify!($module),)*
        ];
    };
}
