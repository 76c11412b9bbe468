use nalgebra::Vector3;
use named_vec_ops::NamedVecOps;
use named_vec_ops_derive::NamedVecOps;

#[derive(Debug, Copy, Clone, PartialEq, NamedVecOps)]
struct Pose<T> {
    x: T,
    y: T,
    heading: T,
}

#[test]
fn vector_order_follows_field_order() {
    let pose = Pose {
        x: 1.0,
        y: 2.0,
        heading: 3.0,
    };
    let v = pose.to_svector();
    assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0]);
    assert_eq!(Pose::from_svector(&v), pose);
    assert_eq!(<Pose<f64> as NamedVecOps<f64, 3>>::SIZE, 3);
}

#[test]
fn from_fn_fills_in_field_order() {
    let pose = Pose::from_fn(|i| i as f64 * 10.0);
    let expected = Pose {
        x: 0.0,
        y: 10.0,
        heading: 20.0,
    };
    assert_eq!(pose, expected);
}

#[test]
fn field_names_are_listed_in_order() {
    assert_eq!(<Pose<f64>>::field_names(), ["x", "y", "heading"]);
}

#[test]
fn arithmetic_is_element_wise() {
    let a = Pose {
        x: 1.0,
        y: -2.0,
        heading: 0.5,
    };
    let b = Pose {
        x: 0.5,
        y: 1.0,
        heading: 0.25,
    };

    assert_eq!((a + b).to_svector(), Vector3::new(1.5, -1.0, 0.75));
    assert_eq!((a - b).to_svector(), Vector3::new(0.5, -3.0, 0.25));
    assert_eq!((a * 2.0).to_svector(), Vector3::new(2.0, -4.0, 1.0));
}
