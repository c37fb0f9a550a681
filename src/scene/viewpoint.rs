//! Viewpoints: how a scene maps onto the screen
//!
//! 3-D overlays use a perspective [`Viewpoint`]; grid and list overlays use a
//! [`PlanarView`] that fits a world rectangle into the viewport. Both support
//! the forward mapping used by the painter and the inverse mapping used by
//! picking.

use egui::{Pos2, Rect};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// A point projected to the screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected {
    pub pos: Pos2,
    /// Distance along the view axis; larger is farther
    pub depth: f32,
    /// Screen pixels per world unit at this depth
    pub pixels_per_unit: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Distance to the nearest intersection with a sphere in front of the origin
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.dir);
        let c = oc.length_squared() - radius * radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let sqrt = disc.sqrt();
        let near = -b - sqrt;
        let far = -b + sqrt;
        if near >= 0.0 {
            Some(near)
        } else if far >= 0.0 {
            Some(0.0)
        } else {
            None
        }
    }
}

/// Perspective camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewpoint {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view, radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Viewpoint {
    pub fn looking_at(eye: Vec3, target: Vec3) -> Self {
        Self {
            eye,
            target,
            up: Vec3::Y,
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 1000.0,
        }
    }

    pub fn with_fov_degrees(mut self, degrees: f32) -> Self {
        self.fov_y = degrees.to_radians();
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect.max(1e-3), self.near, self.far)
    }

    fn view_projection(&self, viewport: Rect) -> Mat4 {
        let aspect = viewport.width() / viewport.height().max(1.0);
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Screen position of a world point; `None` if behind the camera
    pub fn project(&self, world: Vec3, viewport: Rect) -> Option<Projected> {
        let clip = self.view_projection(viewport) * Vec4::new(world.x, world.y, world.z, 1.0);
        if clip.w <= self.near {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let pos = Pos2::new(
            viewport.left() + (ndc.x + 1.0) * 0.5 * viewport.width(),
            viewport.top() + (1.0 - ndc.y) * 0.5 * viewport.height(),
        );
        let pixels_per_unit = viewport.height() * 0.5 / ((self.fov_y * 0.5).tan() * clip.w);
        Some(Projected {
            pos,
            depth: clip.w,
            pixels_per_unit,
        })
    }

    /// Ray from the eye through a screen position
    pub fn pick_ray(&self, screen: Pos2, viewport: Rect) -> Ray {
        let ndc_x = (screen.x - viewport.left()) / viewport.width().max(1.0) * 2.0 - 1.0;
        let ndc_y = 1.0 - (screen.y - viewport.top()) / viewport.height().max(1.0) * 2.0;
        let inverse = self.view_projection(viewport).inverse();
        // perspective_rh maps depth to [0, 1]
        let near = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        Ray {
            origin: self.eye,
            dir: (far - near).normalize_or_zero(),
        }
    }
}

/// Fits a world-space rectangle (y down) into the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarView {
    pub world: Rect,
    /// Screen-space margin kept free around the world rectangle
    pub padding: f32,
}

impl PlanarView {
    pub fn new(world: Rect, padding: f32) -> Self {
        Self { world, padding }
    }

    /// Pixels per world unit
    pub fn scale(&self, viewport: Rect) -> f32 {
        let avail_w = (viewport.width() - 2.0 * self.padding).max(1.0);
        let avail_h = (viewport.height() - 2.0 * self.padding).max(1.0);
        let w = self.world.width().max(1e-3);
        let h = self.world.height().max(1e-3);
        (avail_w / w).min(avail_h / h)
    }

    pub fn world_to_screen(&self, world: Vec2, viewport: Rect) -> Pos2 {
        let scale = self.scale(viewport);
        let center = self.world.center();
        let screen_center = viewport.center();
        Pos2::new(
            screen_center.x + (world.x - center.x) * scale,
            screen_center.y + (world.y - center.y) * scale,
        )
    }

    pub fn screen_to_world(&self, screen: Pos2, viewport: Rect) -> Vec2 {
        let scale = self.scale(viewport);
        let center = self.world.center();
        let screen_center = viewport.center();
        Vec2::new(
            center.x + (screen.x - screen_center.x) / scale,
            center.y + (screen.y - screen_center.y) / scale,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective(Viewpoint),
    Planar(PlanarView),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Rect {
        Rect::from_min_size(Pos2::ZERO, egui::vec2(800.0, 600.0))
    }

    #[test]
    fn test_target_projects_to_center() {
        let vp = Viewpoint::looking_at(Vec3::new(0.0, 0.0, 15.0), Vec3::ZERO);
        let projected = vp.project(Vec3::ZERO, viewport()).unwrap();
        assert!((projected.pos.x - 400.0).abs() < 1e-3);
        assert!((projected.pos.y - 300.0).abs() < 1e-3);
        assert!((projected.depth - 15.0).abs() < 1e-3);
    }

    #[test]
    fn test_point_behind_camera_is_culled() {
        let vp = Viewpoint::looking_at(Vec3::new(0.0, 0.0, 15.0), Vec3::ZERO);
        assert!(vp.project(Vec3::new(0.0, 0.0, 20.0), viewport()).is_none());
    }

    #[test]
    fn test_pick_ray_through_center_hits_target() {
        let vp = Viewpoint::looking_at(Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO);
        let ray = vp.pick_ray(Pos2::new(400.0, 300.0), viewport());
        assert!((ray.dir - Vec3::NEG_X).length() < 1e-4);
        assert!(ray.intersect_sphere(Vec3::ZERO, 0.5).is_some());
        assert!(ray.intersect_sphere(Vec3::new(0.0, 3.0, 0.0), 0.5).is_none());
    }

    #[test]
    fn test_pick_ray_inverts_projection() {
        let vp = Viewpoint::looking_at(Vec3::new(3.0, 2.0, 12.0), Vec3::ZERO);
        let point = Vec3::new(1.5, -0.8, 0.4);
        let screen = vp.project(point, viewport()).unwrap().pos;
        let ray = vp.pick_ray(screen, viewport());
        assert!(ray.intersect_sphere(point, 0.05).is_some());
    }

    #[test]
    fn test_sphere_behind_ray_is_missed() {
        let ray = Ray {
            origin: Vec3::ZERO,
            dir: Vec3::X,
        };
        assert!(ray.intersect_sphere(Vec3::new(-5.0, 0.0, 0.0), 1.0).is_none());
        assert_eq!(ray.intersect_sphere(Vec3::new(5.0, 0.0, 0.0), 1.0), Some(4.0));
    }

    #[test]
    fn test_planar_round_trip() {
        let view = PlanarView::new(Rect::from_min_size(Pos2::ZERO, egui::vec2(40.0, 30.0)), 20.0);
        let world = Vec2::new(12.0, 7.5);
        let screen = view.world_to_screen(world, viewport());
        let back = view.screen_to_world(screen, viewport());
        assert!((back - world).length() < 1e-3);
        assert!((view.scale(viewport()) - 18.666_666).abs() < 1e-3);
    }
}
